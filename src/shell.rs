use clap::ValueEnum;

use crate::credentials::{ProcessCredentials, TemporaryCredentials};
use crate::environment::{
    ASSUMED_ROLE, AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SECURITY_TOKEN, AWS_SESSION_TOKEN,
    RESERVED_KEYS,
};

/// Output syntax for printed credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// POSIX shells: `export KEY='value'`
    #[value(aliases = ["zsh", "sh"])]
    Bash,
    /// Windows PowerShell: `$env:KEY='value'`
    #[value(aliases = ["power-shell", "pwsh"])]
    Powershell,
    /// fish: `set -gx KEY 'value';`
    Fish,
    /// `credential_process` JSON document
    Json,
}

/// Picks the output format from an explicit choice, the `SHELL` variable, then
/// the operating system's interactive default.
pub fn select_format(explicit: Option<Format>, shell: Option<&str>, os: &str) -> Format {
    if let Some(format) = explicit {
        return format;
    }
    let shell = shell.unwrap_or_default();
    if shell.ends_with("fish") {
        return Format::Fish;
    }
    if shell.is_empty() && os == "windows" {
        return Format::Powershell;
    }
    Format::Bash
}

/// Statement syntax of an interactive shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Posix,
    Fish,
    Powershell,
}

impl Format {
    /// The shell dialect behind this format, `None` for JSON.
    pub fn dialect(self) -> Option<Dialect> {
        match self {
            Format::Bash => Some(Dialect::Posix),
            Format::Fish => Some(Dialect::Fish),
            Format::Powershell => Some(Dialect::Powershell),
            Format::Json => None,
        }
    }
}

/// Renders statements that set the reserved variables, followed by a comment
/// showing how to apply them. `invocation` is the command line that produced
/// the output. Without a session token both token variables are removed so a
/// token from an earlier assumption cannot pair with the new keys.
pub fn render(
    format: Format,
    role: &str,
    credentials: &TemporaryCredentials,
    invocation: &str,
) -> serde_json::Result<String> {
    let Some(dialect) = format.dialect() else {
        let mut json = serde_json::to_string_pretty(&ProcessCredentials::from(credentials))?;
        json.push('\n');
        return Ok(json);
    };

    let mut lines = vec![
        assignment(dialect, AWS_ACCESS_KEY_ID, &credentials.access_key_id),
        assignment(dialect, AWS_SECRET_ACCESS_KEY, &credentials.secret_access_key),
    ];
    match &credentials.session_token {
        Some(token) => {
            lines.push(assignment(dialect, AWS_SESSION_TOKEN, token));
            lines.push(assignment(dialect, AWS_SECURITY_TOKEN, token));
        }
        None => lines.extend(removal(dialect, &[AWS_SESSION_TOKEN, AWS_SECURITY_TOKEN])),
    }
    lines.push(assignment(dialect, ASSUMED_ROLE, role));
    lines.push("# Run this to configure your shell:".to_string());
    lines.push(apply_hint(dialect, invocation));
    Ok(to_script(lines))
}

/// Renders statements that remove the reserved variables from the shell.
pub fn render_reset(dialect: Dialect) -> String {
    to_script(removal(dialect, &RESERVED_KEYS))
}

fn to_script(lines: Vec<String>) -> String {
    let mut script = lines.join("\n");
    script.push('\n');
    script
}

fn assignment(dialect: Dialect, name: &str, value: &str) -> String {
    match dialect {
        Dialect::Posix => format!("export {name}={}", posix_quote(value)),
        Dialect::Fish => format!("set -gx {name} {};", fish_quote(value)),
        Dialect::Powershell => format!("$env:{name}={}", powershell_quote(value)),
    }
}

fn removal(dialect: Dialect, names: &[&str]) -> Vec<String> {
    match dialect {
        Dialect::Posix => vec![format!("unset {}", names.join(" "))],
        Dialect::Fish => names.iter().map(|name| format!("set -e {name};")).collect(),
        Dialect::Powershell => names
            .iter()
            .map(|name| format!("Remove-Item Env:{name} -ErrorAction SilentlyContinue"))
            .collect(),
    }
}

fn apply_hint(dialect: Dialect, invocation: &str) -> String {
    match dialect {
        Dialect::Posix => format!("# eval $({invocation})"),
        Dialect::Fish => format!("# eval ({invocation})"),
        Dialect::Powershell => format!("# {invocation} | Invoke-Expression"),
    }
}

fn posix_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn fish_quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', r"\\").replace('\'', r"\'"))
}

fn powershell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
