//! nauth - credential lifecycle engine for multi-tenant NATS clusters

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use nauth::{
    account::AccountManager,
    config::{Args, Command},
    nats::{ClusterControl, NatsClusterClient},
    orchestrator::{
        manifest, InMemoryDirectory, LocalNatsProvider, Manifest, ProviderRegistry, Reconciler,
        Resource,
    },
    user::UserManager,
    vault::{FileSecretStore, KeyVault},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    nauth::logging::init(&args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("NATS: {}", args.nats.nats_url);
    info!("Operator namespace: {}", args.namespace);
    info!("Secrets: {}", args.secrets_dir.display());

    let vault = KeyVault::new(Arc::new(FileSecretStore::new(&args.secrets_dir)));
    let cluster: Arc<dyn ClusterControl> = Arc::new(NatsClusterClient::new(
        args.nats.cluster_config(),
        vault.clone(),
    ));
    let directory = Arc::new(InMemoryDirectory::new());
    let accounts = AccountManager::new(
        vault.clone(),
        cluster.clone(),
        directory.clone(),
        &args.namespace,
    );

    match &args.command {
        Command::Lookup { account_id } => {
            match accounts.lookup(account_id).await? {
                Some(claims) => {
                    info!(account_id = %account_id, issuer = ?claims.issuer, "Found published claims");
                    println!("{}", serde_yaml::to_string(&claims.view())?);
                }
                None => {
                    warn!(account_id = %account_id, "No claims published");
                    std::process::exit(2);
                }
            }
        }
        Command::Reconcile { manifests_dir } => {
            let users = UserManager::new(vault, directory.clone());
            let provider = Arc::new(LocalNatsProvider::new(accounts, users));
            let reconciler = Reconciler::new(ProviderRegistry::new(provider), directory.clone())
                .with_timeout(args.operation_timeout());

            let failures =
                reconcile_dir(&reconciler, &directory, manifests_dir, &args.namespace).await?;
            if failures > 0 {
                error!("{} resource(s) failed to reconcile", failures);
                std::process::exit(1);
            }
            info!("All resources reconciled");
        }
    }

    Ok(())
}

/// Reconcile every manifest in `dir`, returning the number of failures.
///
/// Accounts are issued before users; deletions run users first so the
/// account deletion guard sees them gone.
async fn reconcile_dir(
    reconciler: &Reconciler,
    directory: &InMemoryDirectory,
    dir: &Path,
    default_namespace: &str,
) -> anyhow::Result<usize> {
    let mut manifests = manifest::load_dir(dir, default_namespace).await?;
    for m in &manifests {
        match &m.resource {
            Resource::Account(a) => directory.put_account(a.clone()),
            Resource::User(u) => directory.put_user(u.clone()),
        }
    }

    let mut failures = 0;
    for phase in [Phase::Accounts, Phase::Users, Phase::UserDeletions, Phase::AccountDeletions] {
        for m in manifests.iter_mut().filter(|m| phase.includes(&m.resource)) {
            if !reconcile_one(reconciler, directory, m).await? {
                failures += 1;
            }
        }
    }
    Ok(failures)
}

#[derive(Clone, Copy)]
enum Phase {
    Accounts,
    Users,
    UserDeletions,
    AccountDeletions,
}

impl Phase {
    fn includes(self, resource: &Resource) -> bool {
        match (self, resource) {
            (Phase::Accounts, Resource::Account(a)) => !a.metadata.is_deleting(),
            (Phase::Users, Resource::User(u)) => !u.metadata.is_deleting(),
            (Phase::UserDeletions, Resource::User(u)) => u.metadata.is_deleting(),
            (Phase::AccountDeletions, Resource::Account(a)) => a.metadata.is_deleting(),
            _ => false,
        }
    }
}

/// Reconcile one resource and persist the outcome; false on failure
async fn reconcile_one(
    reconciler: &Reconciler,
    directory: &InMemoryDirectory,
    manifest: &mut Manifest,
) -> anyhow::Result<bool> {
    let (ok, deleted) = match &mut manifest.resource {
        Resource::Account(account) => {
            let ok = reconciler.reconcile_account(account).await.is_ok();
            let deleted = ok && account.metadata.is_deleting();
            if deleted {
                directory.remove_account(&account.metadata.namespace, &account.metadata.name);
            } else {
                directory.put_account(account.clone());
            }
            (ok, deleted)
        }
        Resource::User(user) => {
            let ok = reconciler.reconcile_user(user).await.is_ok();
            let deleted = ok && user.metadata.is_deleting();
            if deleted {
                directory.remove_user(&user.metadata.namespace, &user.metadata.name);
            } else {
                directory.put_user(user.clone());
            }
            (ok, deleted)
        }
    };

    if deleted {
        manifest.remove().await?;
    } else {
        manifest.save().await?;
    }
    Ok(ok)
}
