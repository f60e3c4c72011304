// src/models/user.rs
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Driver,    // Approved student driver, may post rides
    Passenger, // Default role after registration approval
    Admin,     // Moderation staff
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Driver => f.write_str("driver"),
            Role::Passenger => f.write_str("passenger"),
            Role::Admin => f.write_str("admin"),
        }
    }
}

/// Authenticated identity behind a request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// JWT claims issued by the account service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthClaims {
    pub sub: String,
    pub role: Role,
    pub exp: u64,
    pub iat: u64,
}

impl From<AuthClaims> for Caller {
    fn from(claims: AuthClaims) -> Self {
        Caller::new(claims.sub, claims.role)
    }
}
