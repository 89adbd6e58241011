use std::time::Duration;

use async_trait::async_trait;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::provider_config::ProviderConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_sts::error::DisplayErrorContext;
use aws_sdk_sts::Client as StsClient;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info};

use crate::config::{RoleDescriptor, Target};
use crate::credentials::TemporaryCredentials;
use crate::error::{Error, Result};
use crate::mfa::MfaPrompt;

pub const DEFAULT_SESSION_NAME: &str = "cli";
pub const DEFAULT_DURATION: Duration = Duration::from_secs(3600);
const DEFAULT_AWS_REGION: &str = "us-east-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaToken {
    pub serial_number: String,
    pub token_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub session_name: String,
    pub duration_seconds: i32,
    pub mfa: Option<MfaToken>,
    pub source_profile: Option<String>,
    pub region: Option<String>,
}

/// Remote issuer of temporary credentials.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn assume_role(&self, request: AssumeRoleRequest) -> Result<TemporaryCredentials>;

    /// Resolves a named profile from the shared config files, which performs
    /// any `source_profile` chaining itself. Environment keys never stand in
    /// for the profile.
    async fn profile_credentials(&self, profile: &str) -> Result<TemporaryCredentials>;
}

/// Credentials together with the identity exported as `ASSUMED_ROLE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub role: String,
    pub credentials: TemporaryCredentials,
}

pub struct Resolver<I, P> {
    issuer: I,
    prompt: P,
    session_name: String,
    duration: Duration,
}

impl<I, P> Resolver<I, P>
where
    I: CredentialIssuer,
    P: MfaPrompt,
{
    pub fn new(issuer: I, prompt: P, session_name: impl Into<String>, duration: Duration) -> Self {
        Self {
            issuer,
            prompt,
            session_name: session_name.into(),
            duration,
        }
    }

    pub async fn resolve(&self, target: &Target) -> Result<Resolved> {
        match target {
            Target::Role(descriptor) => Ok(Resolved {
                role: descriptor.identifier.clone(),
                credentials: self.assume(descriptor).await?,
            }),
            Target::Profile(profile) => {
                debug!(profile = %profile, "Assuming role via named profile");
                Ok(Resolved {
                    role: profile.clone(),
                    credentials: self.issuer.profile_credentials(profile).await?,
                })
            }
        }
    }

    /// Issues a single AssumeRole request, prompting for an MFA code first when
    /// the descriptor names a device. Failures are not retried.
    pub async fn assume(&self, descriptor: &RoleDescriptor) -> Result<TemporaryCredentials> {
        let duration_seconds = i32::try_from(self.duration.as_secs()).map_err(|_| {
            Error::InvalidArgument(format!("duration too long: {:?}", self.duration))
        })?;

        let mfa = match &descriptor.mfa_serial {
            Some(serial) => Some(MfaToken {
                serial_number: serial.clone(),
                token_code: self.prompt.read_code(serial)?,
            }),
            None => None,
        };

        debug!(
            role = %descriptor.identifier,
            session_name = %self.session_name,
            duration_seconds,
            mfa = mfa.is_some(),
            "Assuming role via temporary STS credentials"
        );

        let credentials = self
            .issuer
            .assume_role(AssumeRoleRequest {
                role_arn: descriptor.identifier.clone(),
                session_name: self.session_name.clone(),
                duration_seconds,
                mfa,
                source_profile: descriptor.source_profile.clone(),
                region: descriptor.region.clone(),
            })
            .await?;

        debug!(access_key_id = %credentials.access_key_id, "Obtained temporary credentials");
        Ok(credentials)
    }
}

/// Issues credentials through AWS STS and the SDK credential chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct StsIssuer;

impl StsIssuer {
    // Region priority: env vars -> config file -> IMDS -> DEFAULT_AWS_REGION.
    // With a profile, credentials come from that profile alone.
    async fn sdk_config(profile: Option<&str>, region: Option<&str>) -> SdkConfig {
        let loader = |fallback: bool| {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(profile) = profile {
                loader = loader.profile_name(profile);
            }
            if let Some(region) = region.or(fallback.then_some(DEFAULT_AWS_REGION)) {
                loader = loader.region(Region::new(region.to_string()));
            }
            loader
        };

        let mut config = loader(false).load().await;
        match config.region() {
            Some(region) => debug!(%region, "Using region"),
            None => {
                info!("No region configured, using default {DEFAULT_AWS_REGION} for STS");
                config = loader(true).load().await;
            }
        }

        let Some(profile) = profile else {
            return config;
        };
        let provider = Self::profile_provider(profile, config.region().cloned());
        config
            .into_builder()
            .credentials_provider(SharedCredentialsProvider::new(provider))
            .build()
    }

    // The default chain reads AWS_ACCESS_KEY_ID before any profile, so a named
    // profile gets a provider of its own.
    fn profile_provider(profile: &str, region: Option<Region>) -> ProfileFileCredentialsProvider {
        ProfileFileCredentialsProvider::builder()
            .configure(&ProviderConfig::default().with_region(region))
            .profile_name(profile)
            .build()
    }
}

#[async_trait]
impl CredentialIssuer for StsIssuer {
    async fn assume_role(&self, request: AssumeRoleRequest) -> Result<TemporaryCredentials> {
        let config =
            Self::sdk_config(request.source_profile.as_deref(), request.region.as_deref()).await;
        let client = StsClient::new(&config);

        let (serial_number, token_code) = match request.mfa {
            Some(MfaToken {
                serial_number,
                token_code,
            }) => (Some(serial_number), Some(token_code)),
            None => (None, None),
        };

        let response = client
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .duration_seconds(request.duration_seconds)
            .set_serial_number(serial_number)
            .set_token_code(token_code)
            .send()
            .await
            .map_err(|e| Error::AssumeRole {
                role: request.role_arn.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let sts_creds = response.credentials().ok_or_else(|| Error::AssumeRole {
            role: request.role_arn.clone(),
            message: "AWS STS returned no credentials".to_string(),
        })?;
        let expiration = sts_creds.expiration();

        Ok(TemporaryCredentials {
            access_key_id: sts_creds.access_key_id().to_string(),
            secret_access_key: sts_creds.secret_access_key().to_string(),
            session_token: Some(sts_creds.session_token().to_string()),
            expiration: DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos()),
        })
    }

    async fn profile_credentials(&self, profile: &str) -> Result<TemporaryCredentials> {
        let failed = |message: String| Error::AssumeRole {
            role: profile.to_string(),
            message,
        };

        let config = Self::sdk_config(Some(profile), None).await;
        let provider = config
            .credentials_provider()
            .ok_or_else(|| failed("no credentials provider available".to_string()))?;
        let creds = provider
            .provide_credentials()
            .await
            .map_err(|e| failed(DisplayErrorContext(&e).to_string()))?;

        Ok(TemporaryCredentials {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().map(str::to_string),
            expiration: creds.expiry().map(DateTime::<Utc>::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mfa::MockMfaPrompt;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    fn creds() -> TemporaryCredentials {
        TemporaryCredentials {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "secret-material".to_string(),
            session_token: Some("session-material".to_string()),
            expiration: None,
        }
    }

    fn resolver(
        issuer: MockCredentialIssuer,
        prompt: MockMfaPrompt,
    ) -> Resolver<MockCredentialIssuer, MockMfaPrompt> {
        Resolver::new(issuer, prompt, DEFAULT_SESSION_NAME, DEFAULT_DURATION)
    }

    #[tokio::test]
    async fn role_without_mfa_never_prompts() {
        let mut issuer = MockCredentialIssuer::new();
        issuer
            .expect_assume_role()
            .with(eq(AssumeRoleRequest {
                role_arn: "arn:aws:iam::123:role/Dev".to_string(),
                session_name: "cli".to_string(),
                duration_seconds: 3600,
                mfa: None,
                source_profile: None,
                region: None,
            }))
            .times(1)
            .returning(|_| Ok(creds()));
        let mut prompt = MockMfaPrompt::new();
        prompt.expect_read_code().never();

        let target = Target::Role(RoleDescriptor::from_arn("arn:aws:iam::123:role/Dev"));
        let resolved = resolver(issuer, prompt).resolve(&target).await.unwrap();
        assert_eq!(resolved.role, "arn:aws:iam::123:role/Dev");
        assert_eq!(resolved.credentials, creds());
    }

    #[tokio::test]
    async fn role_with_mfa_sends_code() {
        let mut prompt = MockMfaPrompt::new();
        prompt
            .expect_read_code()
            .with(eq("arn:aws:iam::123:mfa/me"))
            .times(1)
            .returning(|_| Ok("123456".to_string()));
        let mut issuer = MockCredentialIssuer::new();
        issuer
            .expect_assume_role()
            .withf(|r| {
                r.mfa
                    == Some(MfaToken {
                        serial_number: "arn:aws:iam::123:mfa/me".to_string(),
                        token_code: "123456".to_string(),
                    })
                    && r.session_name == "ci"
                    && r.duration_seconds == 900
                    && r.source_profile.as_deref() == Some("base")
            })
            .times(1)
            .returning(|_| Ok(creds()));

        let descriptor = RoleDescriptor {
            identifier: "arn:aws:iam::123:role/Dev".to_string(),
            mfa_serial: Some("arn:aws:iam::123:mfa/me".to_string()),
            source_profile: Some("base".to_string()),
            region: None,
        };
        let r = Resolver::new(issuer, prompt, "ci", Duration::from_secs(900));
        r.resolve(&Target::Role(descriptor)).await.unwrap();
    }

    #[tokio::test]
    async fn prompt_failure_skips_request() {
        let mut prompt = MockMfaPrompt::new();
        prompt.expect_read_code().returning(|_| {
            Err(Error::Input(std::io::Error::from(
                std::io::ErrorKind::UnexpectedEof,
            )))
        });
        let mut issuer = MockCredentialIssuer::new();
        issuer.expect_assume_role().never();

        let descriptor = RoleDescriptor {
            identifier: "arn:aws:iam::123:role/Dev".to_string(),
            mfa_serial: Some("serial".to_string()),
            ..Default::default()
        };
        let err = resolver(issuer, prompt)
            .resolve(&Target::Role(descriptor))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }

    #[tokio::test]
    async fn issuer_failure_is_not_retried() {
        let mut issuer = MockCredentialIssuer::new();
        issuer.expect_assume_role().times(1).returning(|r| {
            Err(Error::AssumeRole {
                role: r.role_arn,
                message: "AccessDenied".to_string(),
            })
        });
        let err = resolver(issuer, MockMfaPrompt::new())
            .resolve(&Target::Role(RoleDescriptor::from_arn("arn:aws:iam::1:role/R")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AssumeRole { .. }));
    }

    #[tokio::test]
    async fn profile_uses_provider_chain() {
        let mut issuer = MockCredentialIssuer::new();
        issuer.expect_assume_role().never();
        issuer
            .expect_profile_credentials()
            .with(eq("static"))
            .times(1)
            .returning(|_| Ok(creds()));
        let resolved = resolver(issuer, MockMfaPrompt::new())
            .resolve(&Target::Profile("static".to_string()))
            .await
            .unwrap();
        assert_eq!(resolved.role, "static");
    }

    #[tokio::test]
    async fn duration_out_of_range() {
        let mut issuer = MockCredentialIssuer::new();
        issuer.expect_assume_role().never();
        let r = Resolver::new(
            issuer,
            MockMfaPrompt::new(),
            "cli",
            Duration::from_secs(u64::MAX / 2),
        );
        let err = r
            .resolve(&Target::Role(RoleDescriptor::from_arn("arn:aws:iam::1:role/R")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    // Debug logging is opt-in; even then only the access key id may appear.
    #[tokio::test]
    #[traced_test]
    async fn debug_logs_never_contain_secrets() {
        let mut issuer = MockCredentialIssuer::new();
        issuer.expect_assume_role().returning(|_| Ok(creds()));
        resolver(issuer, MockMfaPrompt::new())
            .resolve(&Target::Role(RoleDescriptor::from_arn("arn:aws:iam::1:role/R")))
            .await
            .unwrap();

        assert!(logs_contain("ASIAEXAMPLE"));
        assert!(!logs_contain("secret-material"));
        assert!(!logs_contain("session-material"));
    }
}
