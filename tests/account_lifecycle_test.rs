//! Account lifecycle integration tests: create, legacy update, import, delete guard

mod common;

use chrono::Utc;
use common::{seed_record, Harness, TENANTS};
use nauth::claims::jwt;
use nauth::claims::nats::{JwtClaims, NatsAccount, NatsAccountDeletion};
use nauth::keys;
use nauth::orchestrator::AccountAction;
use nauth::spec::{
    Account, AccountLimits, AccountRef, AccountSpec, Import, User, UserSpec, LABEL_ACCOUNT_ID,
    LABEL_ACCOUNT_SIGNED_BY, LABEL_MANAGEMENT_POLICY, MANAGEMENT_POLICY_OBSERVE,
};
use nauth::vault::{labels, Labels, SecretLocation, SecretStore, LABEL_MANAGED, LABEL_SECRET_TYPE};
use nauth::NauthError;

#[tokio::test]
async fn test_create_issues_id_stores_two_secrets_and_publishes_once() {
    let h = Harness::new().await;
    let mut account = Account::new(TENANTS, "shop", AccountSpec::default());

    let action = h.reconciler.reconcile_account(&mut account).await.unwrap();
    assert_eq!(action, AccountAction::Create);

    let id = account.account_id().unwrap().to_string();
    assert_eq!(id.len(), 56);
    assert!(id.starts_with('A'));
    assert_eq!(
        account.metadata.label(LABEL_ACCOUNT_SIGNED_BY),
        Some(h.operator.public_key().as_str())
    );
    assert!(account.status.ready);

    let secrets = h.secrets_in(TENANTS).await;
    assert_eq!(secrets.len(), 2);
    let mut types: Vec<_> = secrets
        .iter()
        .map(|s| s.labels[LABEL_SECRET_TYPE].clone())
        .collect();
    types.sort();
    assert_eq!(types, vec!["account-root", "account-sign"]);
    assert!(secrets.iter().all(|s| s.labels[LABEL_ACCOUNT_ID] == id));
    assert!(secrets.iter().all(|s| s.labels[LABEL_MANAGED] == "true"));

    assert_eq!(h.cluster.uploads(), 1);
    let published: JwtClaims<NatsAccount> =
        jwt::decode(&h.cluster.uploads.lock().unwrap()[0]).unwrap();
    assert_eq!(published.sub, id);
    assert_eq!(published.iss, h.operator.public_key());
    assert_eq!(published.nats.limits.conn, -1);
    assert!(published.nats.limits.wildcards);
    assert_eq!(
        published.nats.signing_keys,
        vec![account.status.signing_key.clone().unwrap()]
    );
}

#[tokio::test]
async fn test_create_without_operator_key_fails_before_writing() {
    let h = Harness::new().await;
    h.store
        .delete_by_labels(common::OPERATOR_NAMESPACE, &Labels::new())
        .await
        .unwrap();

    let mut account = Account::new(TENANTS, "shop", AccountSpec::default());
    let err = h.reconciler.reconcile_account(&mut account).await.unwrap_err();

    assert!(matches!(err, NauthError::Precondition(_)));
    assert!(!account.status.ready);
    assert!(account.status.message.is_some());
    assert!(h.secrets_in(TENANTS).await.is_empty());
    assert_eq!(h.cluster.uploads(), 0);
}

#[tokio::test]
async fn test_update_falls_back_to_legacy_secrets_and_labels_them() {
    let h = Harness::new().await;
    let root = keys::generate_account_key();
    let signing = keys::generate_account_key();
    h.store
        .create(seed_record(TENANTS, "shop-ac-root", &root, Labels::new()))
        .await
        .unwrap();
    h.store
        .create(seed_record(TENANTS, "shop-ac-sign", &signing, Labels::new()))
        .await
        .unwrap();

    let mut account = Account::new(
        TENANTS,
        "shop",
        AccountSpec {
            account_limits: Some(AccountLimits {
                conn: Some(100),
                ..Default::default()
            }),
            ..Default::default()
        },
    );
    account.metadata.set_label(LABEL_ACCOUNT_ID, root.public_key());

    let action = h.reconciler.reconcile_account(&mut account).await.unwrap();
    assert_eq!(action, AccountAction::Update);
    assert_eq!(account.account_id(), Some(root.public_key().as_str()));
    assert_eq!(
        account.status.signing_key.as_deref(),
        Some(signing.public_key().as_str())
    );

    for (name, kind) in [("shop-ac-root", "account-root"), ("shop-ac-sign", "account-sign")] {
        let record = h
            .store
            .get(&SecretLocation::new(TENANTS, name))
            .await
            .unwrap();
        assert_eq!(record.labels[LABEL_SECRET_TYPE], kind);
        assert_eq!(record.labels[LABEL_ACCOUNT_ID], root.public_key());
    }

    // no new key material on update
    assert_eq!(h.secrets_in(TENANTS).await.len(), 2);
    let published: JwtClaims<NatsAccount> =
        jwt::decode(&h.cluster.uploads.lock().unwrap()[0]).unwrap();
    assert_eq!(published.nats.limits.conn, 100);
    assert_eq!(published.nats.limits.subs, -1);
}

#[tokio::test]
async fn test_update_with_missing_signing_secret_fails() {
    let h = Harness::new().await;
    let root = keys::generate_account_key();
    h.store
        .create(seed_record(TENANTS, "shop-ac-root", &root, Labels::new()))
        .await
        .unwrap();

    let mut account = Account::new(TENANTS, "shop", AccountSpec::default());
    account.metadata.set_label(LABEL_ACCOUNT_ID, root.public_key());

    let err = h.reconciler.reconcile_account(&mut account).await.unwrap_err();
    assert!(matches!(err, NauthError::MissingSecrets { .. }), "{err}");
    assert_eq!(h.cluster.uploads(), 0);
}

#[tokio::test]
async fn test_unresolved_imports_block_publish() {
    let h = Harness::new().await;
    let imports = ["ghost", "phantom"]
        .into_iter()
        .map(|name| Import {
            account_ref: Some(AccountRef {
                name: name.into(),
                namespace: None,
            }),
            name: format!("{name}-feed"),
            subject: format!("{name}.>"),
            ..Default::default()
        })
        .collect();
    let mut account = Account::new(
        TENANTS,
        "shop",
        AccountSpec {
            imports,
            ..Default::default()
        },
    );

    let err = h.reconciler.reconcile_account(&mut account).await.unwrap_err();
    match err {
        NauthError::Claims(claims) => assert_eq!(claims.issues().len(), 2),
        other => panic!("unexpected error: {other}"),
    }
    let message = account.status.message.unwrap();
    assert!(message.contains("ghost") && message.contains("phantom"));
    assert_eq!(h.cluster.uploads(), 0);
    // nothing is stored for a create that cannot publish
    assert!(h.secrets_in(TENANTS).await.is_empty());
}

#[tokio::test]
async fn test_import_resolves_through_directory() {
    let h = Harness::new().await;
    let mut billing = Account::new(TENANTS, "billing", AccountSpec::default());
    h.reconciler.reconcile_account(&mut billing).await.unwrap();
    h.directory.put_account(billing.clone());

    let mut shop = Account::new(
        TENANTS,
        "shop",
        AccountSpec {
            imports: vec![Import {
                account_ref: Some(AccountRef {
                    name: "billing".into(),
                    namespace: None,
                }),
                name: "invoices".into(),
                subject: "invoices.>".into(),
                ..Default::default()
            }],
            ..Default::default()
        },
    );
    h.reconciler.reconcile_account(&mut shop).await.unwrap();

    let claims = shop.status.claims.unwrap();
    assert_eq!(claims.imports.len(), 1);
    assert_eq!(
        claims.imports[0].account.as_deref(),
        billing.account_id()
    );
}

#[tokio::test]
async fn test_observe_only_account_reports_published_claims() {
    let h = Harness::new().await;
    let mut owned = Account::new(TENANTS, "legacy", AccountSpec::default());
    h.reconciler.reconcile_account(&mut owned).await.unwrap();
    let id = owned.account_id().unwrap().to_string();

    let mut observed = Account::new(TENANTS, "legacy", AccountSpec::default());
    observed.metadata.set_label(LABEL_ACCOUNT_ID, id.clone());
    observed
        .metadata
        .set_label(LABEL_MANAGEMENT_POLICY, MANAGEMENT_POLICY_OBSERVE);

    let action = h.reconciler.reconcile_account(&mut observed).await.unwrap();
    assert_eq!(action, AccountAction::Import);
    assert_eq!(observed.account_id(), Some(id.as_str()));
    assert_eq!(
        observed.status.claims.as_ref().unwrap().account_limits.conn,
        Some(-1)
    );
    // imports never publish
    assert_eq!(h.cluster.uploads(), 1);
}

#[tokio::test]
async fn test_observe_only_without_published_claims_fails() {
    let h = Harness::new().await;
    let root = keys::generate_account_key();
    let signing = keys::generate_account_key();
    let id = root.public_key();
    for (name, kind, kp) in [
        ("ext-ac-root-x", "account-root", &root),
        ("ext-ac-sign-x", "account-sign", &signing),
    ] {
        h.store
            .create(seed_record(
                TENANTS,
                name,
                kp,
                labels([(LABEL_SECRET_TYPE, kind), (LABEL_ACCOUNT_ID, id.as_str())]),
            ))
            .await
            .unwrap();
    }

    let mut observed = Account::new(TENANTS, "ext", AccountSpec::default());
    observed.metadata.set_label(LABEL_ACCOUNT_ID, id);
    observed
        .metadata
        .set_label(LABEL_MANAGEMENT_POLICY, MANAGEMENT_POLICY_OBSERVE);

    let err = h.reconciler.reconcile_account(&mut observed).await.unwrap_err();
    assert!(err.to_string().contains("no claims published"));
}

#[tokio::test]
async fn test_delete_refused_while_users_exist() {
    let h = Harness::new().await;
    let mut account = Account::new(TENANTS, "shop", AccountSpec::default());
    h.reconciler.reconcile_account(&mut account).await.unwrap();
    h.directory.put_user(User::new(
        TENANTS,
        "checkout",
        UserSpec {
            account_name: "shop".into(),
            ..Default::default()
        },
    ));

    account.metadata.deletion_timestamp = Some(Utc::now());
    let err = h.reconciler.reconcile_account(&mut account).await.unwrap_err();

    assert!(matches!(err, NauthError::DeleteGuard { users: 1, .. }));
    assert_eq!(h.cluster.deletes(), 0);
    assert!(h.store.label_deletes.lock().unwrap().is_empty());
    assert_eq!(h.secrets_in(TENANTS).await.len(), 2);
}

#[tokio::test]
async fn test_delete_revokes_once_and_cleans_up_by_label() {
    let h = Harness::new().await;
    let mut account = Account::new(TENANTS, "shop", AccountSpec::default());
    h.reconciler.reconcile_account(&mut account).await.unwrap();
    let id = account.account_id().unwrap().to_string();

    account.metadata.deletion_timestamp = Some(Utc::now());
    let action = h.reconciler.reconcile_account(&mut account).await.unwrap();
    assert_eq!(action, AccountAction::Delete);

    assert_eq!(h.cluster.deletes(), 1);
    let revocation: JwtClaims<NatsAccountDeletion> =
        jwt::decode(&h.cluster.deletes.lock().unwrap()[0]).unwrap();
    assert_eq!(revocation.nats.accounts, vec![id.clone()]);
    assert_eq!(revocation.nats.claim_type, "generic");
    assert_eq!(revocation.iss, h.operator.public_key());
    assert_eq!(revocation.sub, h.operator.public_key());

    let label_deletes = h.store.label_deletes.lock().unwrap().clone();
    assert_eq!(label_deletes, vec![labels([(LABEL_ACCOUNT_ID, id.as_str())])]);
    assert!(h.secrets_in(TENANTS).await.is_empty());
}

#[tokio::test]
async fn test_deleting_observe_only_account_releases_without_revoking() {
    let h = Harness::new().await;
    let mut owned = Account::new(TENANTS, "ext", AccountSpec::default());
    h.reconciler.reconcile_account(&mut owned).await.unwrap();
    let id = owned.account_id().unwrap().to_string();

    let mut observed = Account::new(TENANTS, "ext", AccountSpec::default());
    observed.metadata.set_label(LABEL_ACCOUNT_ID, id.clone());
    observed
        .metadata
        .set_label(LABEL_MANAGEMENT_POLICY, MANAGEMENT_POLICY_OBSERVE);
    observed.metadata.deletion_timestamp = Some(Utc::now());

    let action = h.reconciler.reconcile_account(&mut observed).await.unwrap();
    assert_eq!(action, AccountAction::Release);

    assert_eq!(h.cluster.deletes(), 0);
    assert!(h.store.label_deletes.lock().unwrap().is_empty());
    let secrets = h.secrets_in(TENANTS).await;
    assert_eq!(secrets.len(), 2);
    assert!(secrets.iter().all(|s| s.labels[LABEL_ACCOUNT_ID] == id));
}
