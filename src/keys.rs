//! NATS identity keys
//!
//! Thin layer over `nkeys` for the three key roles the engine handles:
//!
//! - **Account root**: the account's own identity (public id starts with `A`)
//! - **Account signing**: secondary account key used to issue users
//! - **Operator signing**: cluster-wide authority that signs accounts
//!
//! Users get a fresh `U` key on every issuance. Also home of the portable
//! `.creds` bundle format (user JWT + seed in one text blob).

use nkeys::KeyPair;

use crate::types::{NauthError, Result};

/// Length of an encoded nkey public identifier
pub const PUBLIC_KEY_LEN: usize = 56;

/// Prefix character of account public keys
pub const ACCOUNT_PREFIX: char = 'A';

/// Prefix character of operator public keys
pub const OPERATOR_PREFIX: char = 'O';

/// Prefix character of user public keys
pub const USER_PREFIX: char = 'U';

const JWT_BEGIN: &str = "-----BEGIN NATS USER JWT-----";
const JWT_END: &str = "------END NATS USER JWT------";
const SEED_BEGIN: &str = "-----BEGIN USER NKEY SEED-----";
const SEED_END: &str = "------END USER NKEY SEED------";

/// Generate a new account keypair (used for both root and signing keys)
pub fn generate_account_key() -> KeyPair {
    KeyPair::new_account()
}

/// Generate a new user keypair
pub fn generate_user_key() -> KeyPair {
    KeyPair::new_user()
}

/// Reconstruct a keypair from a seed.
///
/// The error never echoes the seed.
pub fn from_seed(seed: &str) -> Result<KeyPair> {
    KeyPair::from_seed(seed.trim())
        .map_err(|e| NauthError::Keys(format!("Invalid seed: {e}")))
}

/// Reconstruct a keypair from a seed and require a specific role prefix
pub fn from_seed_with_prefix(seed: &str, prefix: char) -> Result<KeyPair> {
    let kp = from_seed(seed)?;
    let public = kp.public_key();
    if !public.starts_with(prefix) {
        return Err(NauthError::Keys(format!(
            "Seed for {public} is not a '{prefix}' key"
        )));
    }
    Ok(kp)
}

/// Export the seed of a keypair
pub fn seed_of(kp: &KeyPair) -> Result<String> {
    kp.seed()
        .map_err(|e| NauthError::Keys(format!("Keypair has no seed: {e}")))
}

/// Check that a string is a well-formed public key with the given prefix
pub fn is_public_key(candidate: &str, prefix: char) -> bool {
    candidate.len() == PUBLIC_KEY_LEN
        && candidate.starts_with(prefix)
        && KeyPair::from_public_key(candidate).is_ok()
}

// =============================================================================
// Credentials bundle
// =============================================================================

/// A parsed `.creds` bundle
#[derive(Clone)]
pub struct Credentials {
    pub jwt: String,
    pub seed: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("jwt", &self.jwt)
            .field("seed", &"<redacted>")
            .finish()
    }
}

/// Format a signed user JWT and its seed into the standard `.creds` text
pub fn format_credentials(jwt: &str, seed: &str) -> String {
    format!(
        "{JWT_BEGIN}\n\
        {jwt}\n\
        {JWT_END}\n\n\
        ************************* IMPORTANT *************************\n\
        NKEY Seed printed below can be used to sign and prove identity.\n\
        NKEYs are sensitive and should be treated as secrets.\n\n\
        {SEED_BEGIN}\n\
        {seed}\n\
        {SEED_END}\n\n\
        *************************************************************\n"
    )
}

/// Parse a `.creds` bundle into its JWT and seed
pub fn parse_credentials(contents: &str) -> Result<Credentials> {
    let jwt = block_after(contents, JWT_BEGIN)
        .ok_or_else(|| NauthError::Keys("Credentials contain no user JWT block".into()))?;
    let seed = block_after(contents, SEED_BEGIN)
        .ok_or_else(|| NauthError::Keys("Credentials contain no nkey seed block".into()))?;

    // validate without leaking the seed into the error
    from_seed_with_prefix(&seed, 'U')
        .map_err(|_| NauthError::Keys("Credentials carry an invalid user seed".into()))?;

    Ok(Credentials { jwt, seed })
}

/// First non-empty line following a `BEGIN` marker
fn block_after(contents: &str, marker: &str) -> Option<String> {
    let mut lines = contents.lines().map(str::trim);
    lines.by_ref().find(|line| line.starts_with(marker))?;
    lines
        .find(|line| !line.is_empty())
        .filter(|line| !line.starts_with("---"))
        .map(str::to_string)
}
