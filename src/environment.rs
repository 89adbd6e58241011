use std::collections::BTreeMap;
use std::env;

use tracing::debug;

use crate::credentials::TemporaryCredentials;

pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const AWS_SECURITY_TOKEN: &str = "AWS_SECURITY_TOKEN";
pub const ASSUMED_ROLE: &str = "ASSUMED_ROLE";

/// Variables owned by this tool. At most one assumed identity lives in them at a time.
pub const RESERVED_KEYS: [&str; 5] = [
    AWS_ACCESS_KEY_ID,
    AWS_SECRET_ACCESS_KEY,
    AWS_SESSION_TOKEN,
    AWS_SECURITY_TOKEN,
    ASSUMED_ROLE,
];

/// A mutable set of environment variables.
pub trait EnvStore {
    fn var(&self, key: &str) -> Option<String>;
    fn set_var(&mut self, key: &str, value: &str);
    fn remove_var(&mut self, key: &str);
}

/// The environment of the running process, inherited by anything it execs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvStore for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    fn set_var(&mut self, key: &str, value: &str) {
        env::set_var(key, value);
    }

    fn remove_var(&mut self, key: &str) {
        env::remove_var(key);
    }
}

impl EnvStore for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }

    fn set_var(&mut self, key: &str, value: &str) {
        self.insert(key.to_string(), value.to_string());
    }

    fn remove_var(&mut self, key: &str) {
        self.remove(key);
    }
}

#[derive(Debug, Default)]
pub struct EnvironmentManager<E> {
    store: E,
}

impl<E: EnvStore> EnvironmentManager<E> {
    pub fn new(store: E) -> Self {
        Self { store }
    }

    pub fn into_inner(self) -> E {
        self.store
    }

    pub fn var(&self, key: &str) -> Option<String> {
        self.store.var(key)
    }

    /// Whether a previous invocation left an assumed role behind.
    pub fn has_assumed_role(&self) -> bool {
        self.store.var(ASSUMED_ROLE).is_some()
    }

    /// Removes every reserved variable. Absent keys are ignored.
    pub fn reset(&mut self) {
        let previous_role = self.store.var(ASSUMED_ROLE).unwrap_or_default();
        let previous_key = self.store.var(AWS_ACCESS_KEY_ID).unwrap_or_default();
        debug!(
            assumed_role = %previous_role,
            access_key_id = %previous_key,
            "Resetting credential variables"
        );
        for key in RESERVED_KEYS {
            self.store.remove_var(key);
        }
    }

    /// Resets, then exports `credentials` with `AWS_SECURITY_TOKEN` mirroring
    /// the session token and `ASSUMED_ROLE` set to `role`.
    pub fn install(&mut self, role: &str, credentials: &TemporaryCredentials) {
        self.reset();
        self.store.set_var(AWS_ACCESS_KEY_ID, &credentials.access_key_id);
        self.store.set_var(AWS_SECRET_ACCESS_KEY, &credentials.secret_access_key);
        if let Some(token) = &credentials.session_token {
            self.store.set_var(AWS_SESSION_TOKEN, token);
            self.store.set_var(AWS_SECURITY_TOKEN, token);
        }
        self.store.set_var(ASSUMED_ROLE, role);
        debug!(role, access_key_id = %credentials.access_key_id, "Installed credential variables");
    }
}
