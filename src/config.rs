use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ini::Ini;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

static ROLE_ARN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^arn:[^:]+:iam::[^:]+:role/[^/]+(/.+)?$").expect("role ARN pattern is valid")
});

/// Keys that make a shared-config profile resolvable by the SDK without a `role_arn`.
const CREDENTIAL_SOURCE_KEYS: [&str; 5] = [
    "credential_process",
    "sso_session",
    "sso_start_url",
    "aws_access_key_id",
    "web_identity_token_file",
];

/// A role to assume, as resolved from an ARN, the legacy roles file or a shared-config profile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleDescriptor {
    pub identifier: String,
    pub mfa_serial: Option<String>,
    /// Profile whose credentials sign the AssumeRole call. Ambient chain when unset.
    pub source_profile: Option<String>,
    pub region: Option<String>,
}

impl RoleDescriptor {
    pub fn from_arn(arn: &str) -> Self {
        Self {
            identifier: arn.to_string(),
            ..Default::default()
        }
    }
}

/// Role names mapped to descriptors, as read from the legacy roles file.
pub type RoleRegistry = BTreeMap<String, RoleDescriptor>;

/// What a role name resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Assume this role directly.
    Role(RoleDescriptor),
    /// Let the SDK credential chain resolve this profile.
    Profile(String),
}

/// Locations of the files consulted during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub roles: PathBuf,
    pub config: PathBuf,
    pub credentials: PathBuf,
}

impl ConfigPaths {
    pub fn from_home(home: &Path) -> Self {
        let aws = home.join(".aws");
        Self {
            roles: aws.join("roles"),
            config: aws.join("config"),
            credentials: aws.join("credentials"),
        }
    }

    /// Paths under the user's home directory, honouring `AWS_CONFIG_FILE` and
    /// `AWS_SHARED_CREDENTIALS_FILE`.
    pub fn discover() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            Error::InvalidArgument("unable to determine the home directory".to_string())
        })?;
        let mut paths = Self::from_home(&home);
        if let Ok(path) = env::var("AWS_CONFIG_FILE") {
            paths.config = PathBuf::from(path);
        }
        if let Ok(path) = env::var("AWS_SHARED_CREDENTIALS_FILE") {
            paths.credentials = PathBuf::from(path);
        }
        Ok(paths)
    }
}

pub fn is_role_arn(name: &str) -> bool {
    ROLE_ARN.is_match(name)
}

/// Resolves `name` in precedence order: literal role ARN, legacy roles file,
/// `profile <name>` in the shared config, then any profile the SDK knows about.
pub fn resolve_target(name: &str, paths: &ConfigPaths) -> Result<Target> {
    if is_role_arn(name) {
        debug!(role = name, "Using literal role ARN");
        return Ok(Target::Role(RoleDescriptor::from_arn(name)));
    }

    if paths.roles.is_file() {
        warn!(
            path = %paths.roles.display(),
            "Using deprecated role file, switch to profiles in the shared config file \
             (https://docs.aws.amazon.com/cli/latest/userguide/cli-roles.html)"
        );
        let registry = load_legacy_roles(&paths.roles)?;
        return registry
            .get(name)
            .cloned()
            .map(Target::Role)
            .ok_or_else(|| Error::ConfigNotFound {
                name: name.to_string(),
                source_name: paths.roles.display().to_string(),
            });
    }

    let config = load_ini_if_present(&paths.config)?;
    if let Some(ini) = &config {
        if let Some(descriptor) = shared_config_role(ini, name, &paths.config)? {
            debug!(role = %descriptor.identifier, profile = name, "Using role from shared config");
            return Ok(Target::Role(descriptor));
        }
    }

    let credentials = load_ini_if_present(&paths.credentials)?;
    if profile_known(name, config.as_ref(), credentials.as_ref()) {
        debug!(profile = name, "Falling back to the SDK credential chain");
        return Ok(Target::Profile(name.to_string()));
    }

    Err(Error::ConfigNotFound {
        name: name.to_string(),
        source_name: format!(
            "{} or {}",
            paths.config.display(),
            paths.credentials.display()
        ),
    })
}

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    role: String,
    #[serde(default)]
    mfa: Option<String>,
}

/// Reads the YAML `name: { role, mfa }` mapping of the legacy roles file.
pub fn load_legacy_roles(path: &Path) -> Result<RoleRegistry> {
    let contents = fs::read_to_string(path).map_err(|e| Error::ConfigParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if contents.trim().is_empty() {
        return Ok(RoleRegistry::new());
    }
    let entries: Option<BTreeMap<String, LegacyEntry>> =
        serde_yaml::from_str(&contents).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(entries
        .unwrap_or_default()
        .into_iter()
        .map(|(name, entry)| {
            let descriptor = RoleDescriptor {
                identifier: entry.role,
                mfa_serial: non_empty(entry.mfa.as_deref()),
                ..Default::default()
            };
            (name, descriptor)
        })
        .collect())
}

fn load_ini_if_present(path: &Path) -> Result<Option<Ini>> {
    if !path.is_file() {
        return Ok(None);
    }
    Ini::load_from_file(path)
        .map(Some)
        .map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn shared_config_role(ini: &Ini, name: &str, path: &Path) -> Result<Option<RoleDescriptor>> {
    let Some(section) = ini.section(Some(format!("profile {name}"))) else {
        return Ok(None);
    };

    match non_empty(section.get("role_arn")) {
        Some(identifier) => Ok(Some(RoleDescriptor {
            identifier,
            mfa_serial: non_empty(section.get("mfa_serial")),
            source_profile: non_empty(section.get("source_profile")),
            region: non_empty(section.get("region")),
        })),
        None if CREDENTIAL_SOURCE_KEYS.iter().any(|k| section.contains_key(k)) => Ok(None),
        None => Err(Error::ConfigParse {
            path: path.to_path_buf(),
            message: format!("profile {name} has no role_arn"),
        }),
    }
}

fn profile_known(name: &str, config: Option<&Ini>, credentials: Option<&Ini>) -> bool {
    let in_config = config.is_some_and(|ini| {
        ini.section(Some(format!("profile {name}"))).is_some()
            || (name == "default" && ini.section(Some("default")).is_some())
    });
    let in_credentials = credentials.is_some_and(|ini| ini.section(Some(name)).is_some());
    in_config || in_credentials
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    struct Fixture {
        _home: TempDir,
        paths: ConfigPaths,
    }

    fn fixture(roles: Option<&str>, config: Option<&str>, credentials: Option<&str>) -> Fixture {
        let home = TempDir::new().unwrap();
        let paths = ConfigPaths::from_home(home.path());
        fs::create_dir_all(home.path().join(".aws")).unwrap();
        for (path, contents) in [
            (&paths.roles, roles),
            (&paths.config, config),
            (&paths.credentials, credentials),
        ] {
            if let Some(contents) = contents {
                fs::write(path, contents).unwrap();
            }
        }
        Fixture { _home: home, paths }
    }

    #[rstest]
    #[case("arn:aws:iam::123456789012:role/Dev", true)]
    #[case("arn:aws:iam::123456789012:role/Dev/team/path", true)]
    #[case("arn:aws-cn:iam::123456789012:role/Dev", true)]
    #[case("arn:aws-us-gov:iam::123456789012:role/Dev", true)]
    #[case("arn:aws:iam::123456789012:user/Dev", false)]
    #[case("arn:aws:sts::123456789012:role/Dev", false)]
    #[case("dev", false)]
    #[case("", false)]
    fn role_arn_pattern(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_role_arn(name), expected);
    }

    #[test]
    fn arn_bypasses_config_files() {
        // Both files are malformed; reading either would fail.
        let f = fixture(Some(": : not yaml ["), Some("[profile x\nbroken"), None);
        let arn = "arn:aws:iam::123456789012:role/Dev";
        let target = resolve_target(arn, &f.paths).unwrap();
        assert_eq!(target, Target::Role(RoleDescriptor::from_arn(arn)));
    }

    #[test]
    fn legacy_file_entry() {
        let f = fixture(
            Some("dev:\n  role: arn:aws:iam::123:role/Dev\n  mfa: \"\"\nprod:\n  role: arn:aws:iam::456:role/Prod\n  mfa: arn:aws:iam::123:mfa/me\n"),
            None,
            None,
        );
        assert_eq!(
            resolve_target("dev", &f.paths).unwrap(),
            Target::Role(RoleDescriptor::from_arn("arn:aws:iam::123:role/Dev"))
        );
        assert_eq!(
            resolve_target("prod", &f.paths).unwrap(),
            Target::Role(RoleDescriptor {
                identifier: "arn:aws:iam::456:role/Prod".to_string(),
                mfa_serial: Some("arn:aws:iam::123:mfa/me".to_string()),
                ..Default::default()
            })
        );
    }

    #[test]
    fn legacy_file_takes_precedence_and_misses_are_fatal() {
        let f = fixture(
            Some("dev:\n  role: arn:aws:iam::123:role/Dev\n"),
            Some("[profile other]\nrole_arn = arn:aws:iam::123:role/Other\n"),
            None,
        );
        let err = resolve_target("other", &f.paths).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }), "{err:?}");
    }

    #[test]
    fn legacy_file_malformed() {
        let f = fixture(Some("dev: [unterminated"), None, None);
        let err = resolve_target("dev", &f.paths).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }), "{err:?}");
    }

    #[test]
    fn empty_legacy_file_is_an_empty_registry() {
        let f = fixture(Some(""), None, None);
        assert!(load_legacy_roles(&f.paths.roles).unwrap().is_empty());
    }

    #[test]
    fn shared_config_profile() {
        let f = fixture(
            None,
            Some(
                "[default]\nregion = us-west-2\n\n\
                 [profile dev]\nrole_arn = arn:aws:iam::123:role/Dev\nmfa_serial = arn:aws:iam::123:mfa/me\n\
                 source_profile = base\nregion = eu-west-1\n",
            ),
            None,
        );
        assert_eq!(
            resolve_target("dev", &f.paths).unwrap(),
            Target::Role(RoleDescriptor {
                identifier: "arn:aws:iam::123:role/Dev".to_string(),
                mfa_serial: Some("arn:aws:iam::123:mfa/me".to_string()),
                source_profile: Some("base".to_string()),
                region: Some("eu-west-1".to_string()),
            })
        );
    }

    #[test]
    fn shared_config_profile_without_role_arn() {
        let f = fixture(None, Some("[profile dev]\nregion = eu-west-1\n"), None);
        let err = resolve_target("dev", &f.paths).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }), "{err:?}");
    }

    #[test]
    fn shared_config_profile_with_other_credential_source() {
        let f = fixture(
            None,
            Some("[profile sso]\nsso_session = corp\nsso_account_id = 123\n"),
            None,
        );
        assert_eq!(
            resolve_target("sso", &f.paths).unwrap(),
            Target::Profile("sso".to_string())
        );
    }

    #[test]
    fn only_prefixed_sections_are_roles() {
        let f = fixture(
            None,
            Some("[dev]\nrole_arn = arn:aws:iam::123:role/Dev\n"),
            None,
        );
        let err = resolve_target("dev", &f.paths).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }), "{err:?}");
    }

    #[rstest]
    #[case("static")]
    #[case("default")]
    fn credentials_file_profile(#[case] name: &str) {
        let f = fixture(
            None,
            None,
            Some("[static]\naws_access_key_id = AKIA\naws_secret_access_key = s\n\n[default]\naws_access_key_id = AKIA\naws_secret_access_key = s\n"),
        );
        assert_eq!(
            resolve_target(name, &f.paths).unwrap(),
            Target::Profile(name.to_string())
        );
    }

    #[test]
    fn unknown_name() {
        let f = fixture(None, Some("[profile dev]\nrole_arn = arn:aws:iam::1:role/D\n"), None);
        let err = resolve_target("nope", &f.paths).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { ref name, .. } if name == "nope"));
    }

    #[test]
    fn no_files_at_all() {
        let f = fixture(None, None, None);
        let err = resolve_target("dev", &f.paths).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }), "{err:?}");
    }
}
