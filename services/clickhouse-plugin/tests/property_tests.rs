//! Property-based tests for the account lifecycle.
//!
//! Property 6: Created accounts authenticate with the requested password
//! Property 7: Rotation replaces the password
//! Property 8: Revocation removes the account and is idempotent
//! Property 9: Failed creation leaves no account behind
//! Property 10: Blank fragments are never sent to the server
//! Property 11: Revoking an unknown account succeeds without DDL

use clickhouse_plugin::Clickhouse;
use dbplugin::{
    ChangePassword, Database, DeleteUserRequest, InitializeRequest, NewUserRequest, RequestContext, Statements,
    UpdateUserRequest,
};
use proptest::prelude::*;
use test_utils::fixtures::{ADMIN_PASSWORD, BROKEN_CREATE_STATEMENTS, CREATE_STATEMENTS, connection_config, statements};
use test_utils::{
    MockClickhouse, MockConnectionProducer, account_name_strategy, padded_statements_strategy, password_strategy,
    username_metadata_strategy,
};

async fn initialized(server: &MockClickhouse) -> Clickhouse<MockConnectionProducer> {
    let plugin = Clickhouse::new(server.producer());
    plugin
        .initialize(
            &RequestContext::background(),
            InitializeRequest {
                config: connection_config("http://localhost:8123", ADMIN_PASSWORD),
                verify_connection: true,
            },
        )
        .await
        .unwrap();
    plugin
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property 6: Created accounts authenticate with the requested password
    ///
    /// The generated name follows the default template and the password
    /// survives binding even when it holds quote characters.
    #[test]
    fn prop_created_account_authenticates(
        metadata in username_metadata_strategy(),
        password in password_strategy(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let server = MockClickhouse::new();
            let plugin = initialized(&server).await;
            let ctx = RequestContext::background();

            let req = NewUserRequest::new(metadata, statements(CREATE_STATEMENTS), password.clone());
            let username = plugin.new_user(&ctx, req).await.unwrap().username;

            prop_assert!(username.starts_with("v-"));
            prop_assert!(username.chars().count() <= 32);
            prop_assert!(server.authenticate(&username, &password));
            Ok(())
        })?;
    }

    /// Property 7: Rotation replaces the password
    #[test]
    fn prop_rotation_replaces_password(
        metadata in username_metadata_strategy(),
        initial in password_strategy(),
        rotated in password_strategy(),
        clustered in any::<bool>(),
    ) {
        prop_assume!(initial != rotated);

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let server = if clustered { MockClickhouse::clustered() } else { MockClickhouse::new() };
            let plugin = initialized(&server).await;
            let ctx = RequestContext::background();

            let req = NewUserRequest::new(metadata, statements(CREATE_STATEMENTS), initial.clone());
            let username = plugin.new_user(&ctx, req).await.unwrap().username;

            let update = UpdateUserRequest::new(
                username.clone(),
                Some(ChangePassword::new(rotated.clone(), Statements::default())),
            );
            plugin.update_user(&ctx, update).await.unwrap();

            prop_assert!(server.authenticate(&username, &rotated));
            prop_assert!(!server.authenticate(&username, &initial));
            Ok(())
        })?;
    }

    /// Property 8: Revocation removes the account and is idempotent
    #[test]
    fn prop_revocation_is_idempotent(
        metadata in username_metadata_strategy(),
        password in password_strategy(),
        repeats in 1usize..4,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let server = MockClickhouse::new();
            let plugin = initialized(&server).await;
            let ctx = RequestContext::background();

            let req = NewUserRequest::new(metadata, statements(CREATE_STATEMENTS), password);
            let username = plugin.new_user(&ctx, req).await.unwrap().username;

            for _ in 0..repeats {
                let delete = DeleteUserRequest::new(username.clone(), Statements::default());
                plugin.delete_user(&ctx, delete).await.unwrap();
                prop_assert!(!server.user_exists(&username));
            }
            Ok(())
        })?;
    }

    /// Property 9: Failed creation leaves no account behind
    ///
    /// The error never carries the password of the account being created.
    #[test]
    fn prop_failed_creation_rolls_back(
        metadata in username_metadata_strategy(),
        password in "[A-Za-z0-9]{24}",
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let server = MockClickhouse::new();
            let plugin = initialized(&server).await;

            let req = NewUserRequest::new(metadata, statements(BROKEN_CREATE_STATEMENTS), password.clone());
            let err = plugin.new_user(&RequestContext::background(), req).await.unwrap_err();

            prop_assert_eq!(err.kind(), "execution");
            prop_assert!(!err.to_string().contains(&password));
            prop_assert!(server.users().is_empty());
            Ok(())
        })?;
    }

    /// Property 10: Blank fragments are never sent to the server
    #[test]
    fn prop_blank_fragments_skipped(
        metadata in username_metadata_strategy(),
        stmts in padded_statements_strategy(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let server = MockClickhouse::new();
            let plugin = initialized(&server).await;

            let req = NewUserRequest::new(metadata, stmts, "Padded-Passw0rd");
            let username = plugin.new_user(&RequestContext::background(), req).await.unwrap().username;

            prop_assert!(server.executed().iter().all(|sql| !sql.trim().is_empty()));
            prop_assert!(server.authenticate(&username, "Padded-Passw0rd"));
            Ok(())
        })?;
    }

    /// Property 11: Revoking an unknown account succeeds without DDL
    #[test]
    fn prop_unknown_account_revocation_is_noop(name in account_name_strategy(), clustered in any::<bool>()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let server = if clustered { MockClickhouse::clustered() } else { MockClickhouse::new() };
            let plugin = initialized(&server).await;

            let delete = DeleteUserRequest::new(name, Statements::default());
            plugin.delete_user(&RequestContext::background(), delete).await.unwrap();

            prop_assert!(server.executed().iter().all(|sql| !sql.starts_with("DROP")));
            Ok(())
        })?;
    }
}
