//! The `load_netrc` step and a small `.netrc` parser.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::auth::basic;
use crate::{Error, Netrc, RequestContext, Result};

pub(super) fn load_netrc(request: &mut RequestContext) -> Result<()> {
    let options = request.options();
    let Some(netrc) = options.netrc.as_ref() else {
        return Ok(());
    };
    if options.auth.is_some() {
        return Ok(());
    }
    let Some(host) = request
        .url()
        .as_absolute()
        .and_then(url::Url::host_str)
        .map(str::to_string)
    else {
        return Ok(());
    };

    let text = match netrc {
        Netrc::Path(path) => read(path)?,
        Netrc::Default => {
            let Some(path) = default_path() else {
                return Ok(());
            };
            match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "no netrc file");
                    return Ok(());
                }
                Err(err) => return Err(unreadable(&path, &err)),
            }
        }
    };

    let file = NetrcFile::parse(&text)
        .map_err(|message| Error::config(format!("malformed netrc file: {message}")))?;

    if let Some((login, password)) = file.credentials(&host) {
        debug!(%host, "using netrc credentials");
        let value = basic(&format!("{login}:{password}"));
        request.headers_mut().insert("authorization", value);
    }
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| unreadable(path, &err))
}

fn unreadable(path: &Path, err: &io::Error) -> Error {
    Error::config(format!("cannot read netrc file {}: {err}", path.display()))
}

/// `$NETRC`, else `.netrc` in the home directory.
fn default_path() -> Option<PathBuf> {
    std::env::var_os("NETRC")
        .map(PathBuf::from)
        .or_else(|| home::home_dir().map(|home| home.join(".netrc")))
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Entry {
    login: Option<String>,
    password: Option<String>,
    account: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct NetrcFile {
    machines: Vec<(String, Entry)>,
    default: Option<Entry>,
}

impl NetrcFile {
    fn parse(text: &str) -> std::result::Result<Self, String> {
        let mut file = Self::default();
        let mut current: Option<(Option<String>, Entry)> = None;
        let mut tokens = tokenize(text).into_iter();

        while let Some(token) = tokens.next() {
            match token.as_str() {
                "machine" => {
                    let name = tokens.next().ok_or("missing name after 'machine'")?;
                    file.push(current.take());
                    current = Some((Some(name), Entry::default()));
                }
                "default" => {
                    file.push(current.take());
                    current = Some((None, Entry::default()));
                }
                "login" | "password" | "account" => {
                    let value = tokens
                        .next()
                        .ok_or_else(|| format!("missing value after '{token}'"))?;
                    let (_, entry) = current
                        .as_mut()
                        .ok_or_else(|| format!("'{token}' outside of a machine entry"))?;
                    let field = match token.as_str() {
                        "login" => &mut entry.login,
                        "password" => &mut entry.password,
                        _ => &mut entry.account,
                    };
                    *field = Some(value);
                }
                other => return Err(format!("unexpected token '{other}'")),
            }
        }
        file.push(current);

        Ok(file)
    }

    fn push(&mut self, entry: Option<(Option<String>, Entry)>) {
        match entry {
            Some((Some(machine), entry)) => self.machines.push((machine, entry)),
            Some((None, entry)) => self.default = Some(entry),
            None => {}
        }
    }

    /// Login and password for `host`, falling back to the `default` entry.
    fn credentials(&self, host: &str) -> Option<(&str, &str)> {
        let entry = self
            .machines
            .iter()
            .find(|(machine, _)| machine.eq_ignore_ascii_case(host))
            .map(|(_, entry)| entry)
            .or(self.default.as_ref())?;
        Some((entry.login.as_deref()?, entry.password.as_deref()?))
    }
}

/// Whitespace separated tokens; `#` comments and `macdef` bodies are skipped.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        for word in line.split_whitespace() {
            if word.starts_with('#') {
                break;
            }
            if word == "macdef" {
                // The macro body runs until the next blank line.
                for body in lines.by_ref() {
                    if body.trim().is_empty() {
                        break;
                    }
                }
                break;
            }
            tokens.push(word.to_string());
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::Options;
    use crate::steps::test_support::context;

    const SAMPLE: &str = "\
# personal hosts
machine api.example.com
  login alice
  password s3cret

machine ftp.example.com login bob password hunter2 account ops
macdef init
cd /pub
binary

default login anonymous password guest
";

    fn netrc_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[test]
    fn parse_entries() {
        let file = NetrcFile::parse(SAMPLE).expect("parse");

        assert_eq!(file.machines.len(), 2);
        assert_eq!(file.credentials("api.example.com"), Some(("alice", "s3cret")));
        assert_eq!(file.credentials("FTP.example.com"), Some(("bob", "hunter2")));
        assert_eq!(file.credentials("other.example.com"), Some(("anonymous", "guest")));
        assert_eq!(
            file.machines.get(1).and_then(|(_, e)| e.account.as_deref()),
            Some("ops")
        );
    }

    #[test]
    fn parse_errors() {
        assert!(NetrcFile::parse("machine").is_err());
        assert!(NetrcFile::parse("machine h login").is_err());
        assert!(NetrcFile::parse("login alice").is_err());
        assert!(NetrcFile::parse("machine h port 21").is_err());
    }

    #[test]
    fn no_default_no_match() {
        let file = NetrcFile::parse("machine a login x password y").expect("parse");
        assert_eq!(file.credentials("b"), None);

        let file = NetrcFile::parse("machine a login x").expect("parse");
        assert_eq!(file.credentials("a"), None);
    }

    #[test]
    fn step_sets_basic_auth() {
        let file = netrc_file(SAMPLE);
        let mut request = context(
            Options::new()
                .url("https://api.example.com/me")
                .netrc(file.path().to_path_buf()),
        );

        load_netrc(&mut request).expect("step");

        assert_eq!(request.header("authorization"), Some("Basic YWxpY2U6czNjcmV0"));
    }

    #[test]
    fn step_without_match_is_a_no_op() {
        let file = netrc_file("machine api.example.com login a password b\n");
        let mut request = context(
            Options::new()
                .url("https://elsewhere.example.com/")
                .netrc(file.path().to_path_buf()),
        );

        load_netrc(&mut request).expect("step");

        assert!(request.header("authorization").is_none());
    }

    #[test]
    fn explicit_auth_wins() {
        let file = netrc_file(SAMPLE);
        let mut request = context(
            Options::new()
                .url("https://api.example.com/")
                .netrc(file.path().to_path_buf())
                .bearer_auth("token"),
        );

        load_netrc(&mut request).expect("step");

        assert!(request.header("authorization").is_none());
    }

    #[test]
    fn unreadable_explicit_path_is_a_config_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut request = context(Options::new().netrc(dir.path().join("missing")));

        let err = load_netrc(&mut request).expect_err("missing file");

        assert!(err.is_config());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let file = netrc_file("machine api.example.com login\n");
        let mut request = context(
            Options::new()
                .url("https://api.example.com/")
                .netrc(file.path().to_path_buf()),
        );

        let err = load_netrc(&mut request).expect_err("malformed");

        assert!(err.to_string().contains("malformed netrc file"));
    }
}
