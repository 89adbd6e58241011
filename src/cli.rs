use std::env;
use std::io::{self, Write};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chrono::Local;
use clap::Parser;
use tracing::info;

use crate::config::{self, ConfigPaths};
use crate::credentials::format_expiration;
use crate::environment::{EnvStore, EnvironmentManager, ProcessEnv};
use crate::exec::{self, ExecRequest};
use crate::mfa::{MfaPrompt, TerminalPrompt};
use crate::resolver::{CredentialIssuer, Resolver, StsIssuer, DEFAULT_SESSION_NAME};
use crate::shell::{self, Format};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "assume-role",
    version,
    about = "Assume an AWS role or profile and print, or exec with, its temporary credentials",
    long_about = None
)]
pub struct Cli {
    /// The duration that the credentials will be valid for (e.g. 1h, 90m, 3600s)
    #[arg(long, default_value = "1h", value_parser = humantime::parse_duration)]
    pub duration: Duration,

    /// Output format [default: inferred from $SHELL and the OS]
    #[arg(long, value_enum)]
    pub format: Option<Format>,

    /// Role session name passed to STS
    #[arg(long = "sessionName", visible_alias = "session-name", default_value = DEFAULT_SESSION_NAME)]
    pub session_name: String,

    /// With a role: clear credential variables before resolving.
    /// Without one: print the statements that clear them.
    #[arg(long)]
    pub reset: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Role ARN, legacy role name, or profile name
    pub role: Option<String>,

    /// Command to exec with the credentials in its environment
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// How an invocation ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Statements were written to stdout.
    Printed,
    /// Credentials are installed; hand the process over to this command.
    Exec(ExecRequest),
}

impl Cli {
    pub fn validate_arguments(&self) -> Result<()> {
        if self.role.is_none() && !self.reset {
            bail!("a role or profile name is required");
        }
        if self.role.is_none() && self.format == Some(Format::Json) {
            bail!("--reset without a role prints shell statements; --format json has none");
        }
        if self.duration.is_zero() {
            bail!("--duration must be greater than zero");
        }
        if self.session_name.trim().is_empty() {
            bail!("--sessionName must not be empty");
        }
        Ok(())
    }

    pub async fn execute(self) -> Result<()> {
        let paths = ConfigPaths::discover()?;
        let resolver = Resolver::new(
            StsIssuer,
            TerminalPrompt,
            self.session_name.as_str(),
            self.duration,
        );
        let mut environment = EnvironmentManager::new(ProcessEnv);
        let invocation = env::args().collect::<Vec<_>>().join(" ");

        let outcome = {
            let mut stdout = io::stdout().lock();
            let outcome = self
                .run(&paths, &resolver, &mut environment, &mut stdout, &invocation)
                .await?;
            stdout.flush()?;
            outcome
        };

        match outcome {
            Outcome::Printed => Ok(()),
            Outcome::Exec(request) => match exec::replace_process(&request)? {},
        }
    }

    /// Resolves credentials and either writes them to `out` or installs them in
    /// `environment` and returns the command to exec.
    pub async fn run<I, P, E, W>(
        &self,
        paths: &ConfigPaths,
        resolver: &Resolver<I, P>,
        environment: &mut EnvironmentManager<E>,
        out: &mut W,
        invocation: &str,
    ) -> Result<Outcome>
    where
        I: CredentialIssuer,
        P: MfaPrompt,
        E: EnvStore,
        W: Write,
    {
        self.validate_arguments()?;
        let format = shell::select_format(
            self.format,
            environment.var("SHELL").as_deref(),
            env::consts::OS,
        );

        let Some(role) = self.role.as_deref() else {
            let dialect = format
                .dialect()
                .ok_or_else(|| anyhow!("no reset statements for {format:?} output"))?;
            out.write_all(shell::render_reset(dialect).as_bytes())?;
            return Ok(Outcome::Printed);
        };

        // Leftovers from an earlier assumption would shadow profile credentials.
        if self.reset || environment.has_assumed_role() {
            environment.reset();
        }

        let target = config::resolve_target(role, paths)?;
        let resolved = resolver.resolve(&target).await?;
        if let Some(expiration) = &resolved.credentials.expiration {
            info!(
                "Credentials expire at {}",
                format_expiration(Some(expiration), &Local)
            );
        }

        if self.command.is_empty() {
            let rendered = shell::render(format, &resolved.role, &resolved.credentials, invocation)?;
            out.write_all(rendered.as_bytes())?;
            return Ok(Outcome::Printed);
        }

        let request = ExecRequest::locate(&self.command)?;
        environment.install(&resolved.role, &resolved.credentials);
        Ok(Outcome::Exec(request))
    }
}
