//! User claims
//!
//! Users are issued by their account's signing key (never the root key);
//! `issuer_account` ties the JWT back to the account's public id.

use std::net::IpAddr;

use chrono::NaiveTime;
use nkeys::KeyPair;

use super::account::overlay;
use super::nats::{
    JwtClaims, NatsPermission, NatsResponsePermission, NatsTimeRange, NatsUser, CLAIMS_VERSION,
    NO_LIMIT,
};
use super::{jwt, ClaimsError, ClaimsIssue};
use crate::spec::{
    NatsLimits, Permission, Permissions, ResponsePermission, TimeRange, UserClaimsView,
    UserLimits, UserSpec,
};

/// Immutable user claims ready to be signed by an account signing key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserClaims {
    pub name: String,
    /// User public id
    pub subject: String,
    pub nats: NatsUser,
}

/// Build user claims, validating connection constraints up front
pub fn build_user_claims(
    name: &str,
    user_id: &str,
    account_id: &str,
    spec: &UserSpec,
) -> Result<UserClaims, ClaimsError> {
    let mut nats = NatsUser {
        publish: NatsPermission::default(),
        subscribe: NatsPermission::default(),
        resp: None,
        src: Vec::new(),
        times: Vec::new(),
        times_location: String::new(),
        subs: NO_LIMIT,
        data: NO_LIMIT,
        payload: NO_LIMIT,
        issuer_account: account_id.to_string(),
        claim_type: "user".to_string(),
        version: CLAIMS_VERSION,
    };

    if let Some(limits) = &spec.nats_limits {
        overlay(&mut nats.subs, limits.subs);
        overlay(&mut nats.data, limits.data);
        overlay(&mut nats.payload, limits.payload);
    }

    if let Some(perms) = &spec.permissions {
        nats.publish = permission_claim(&perms.publish);
        nats.subscribe = permission_claim(&perms.subscribe);
        nats.resp = perms.resp.as_ref().map(|r| NatsResponsePermission {
            max: r.max_msgs,
            ttl: r
                .expires
                .map(|d| d.as_nanos().min(i64::MAX as u128) as i64)
                .unwrap_or(0),
        });
    }

    let mut issues = Vec::new();
    if let Some(limits) = &spec.user_limits {
        for cidr in &limits.src {
            if !is_valid_cidr(cidr) {
                issues.push(ClaimsIssue::InvalidSource { cidr: cidr.clone() });
            }
        }
        for range in &limits.times {
            if !is_valid_time(&range.start) || !is_valid_time(&range.end) {
                issues.push(ClaimsIssue::InvalidTimeRange {
                    start: range.start.clone(),
                    end: range.end.clone(),
                });
            }
        }
        nats.src = limits.src.clone();
        nats.times = limits
            .times
            .iter()
            .map(|t| NatsTimeRange {
                start: t.start.clone(),
                end: t.end.clone(),
            })
            .collect();
        nats.times_location = limits.locale.clone().unwrap_or_default();
    }

    if !issues.is_empty() {
        return Err(ClaimsError::Invalid(issues));
    }

    Ok(UserClaims {
        name: name.to_string(),
        subject: user_id.to_string(),
        nats,
    })
}

impl UserClaims {
    /// Encode and sign with the account signing key
    pub fn sign(&self, account_signing: &KeyPair) -> Result<String, ClaimsError> {
        jwt::encode(
            JwtClaims {
                jti: String::new(),
                iat: 0,
                iss: String::new(),
                name: self.name.clone(),
                sub: self.subject.clone(),
                exp: None,
                nats: self.nats.clone(),
            },
            account_signing,
        )
    }

    /// Translate back into the declarative shape used for status reporting
    pub fn view(&self, account_name: &str) -> UserClaimsView {
        let n = &self.nats;
        UserClaimsView {
            account_name: account_name.to_string(),
            permissions: Permissions {
                publish: Permission {
                    allow: n.publish.allow.clone(),
                    deny: n.publish.deny.clone(),
                },
                subscribe: Permission {
                    allow: n.subscribe.allow.clone(),
                    deny: n.subscribe.deny.clone(),
                },
                resp: n.resp.as_ref().map(|r| ResponsePermission {
                    max_msgs: r.max,
                    expires: (r.ttl > 0).then(|| std::time::Duration::from_nanos(r.ttl as u64)),
                }),
            },
            user_limits: UserLimits {
                src: n.src.clone(),
                times: n
                    .times
                    .iter()
                    .map(|t| TimeRange {
                        start: t.start.clone(),
                        end: t.end.clone(),
                    })
                    .collect(),
                locale: Some(n.times_location.clone()).filter(|l| !l.is_empty()),
            },
            nats_limits: NatsLimits {
                subs: Some(n.subs),
                data: Some(n.data),
                payload: Some(n.payload),
            },
        }
    }
}

fn permission_claim(p: &Permission) -> NatsPermission {
    NatsPermission {
        allow: p.allow.clone(),
        deny: p.deny.clone(),
    }
}

fn is_valid_cidr(cidr: &str) -> bool {
    let Some((addr, prefix)) = cidr.trim().split_once('/') else {
        return false;
    };
    let Ok(addr) = addr.parse::<IpAddr>() else {
        return false;
    };
    let max = if addr.is_ipv4() { 32 } else { 128 };
    prefix.parse::<u8>().map(|p| p <= max).unwrap_or(false)
}

fn is_valid_time(s: &str) -> bool {
    NaiveTime::parse_from_str(s, "%H:%M:%S").is_ok()
}
