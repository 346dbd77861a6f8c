//! Target string parsing. A target is either local (a base path) or remote
//! (a host, optional user, base path). Equality is (kind, user?, host?, path).

use std::path::{Path, PathBuf};

use crate::error::{AppDeployError, Result};

/// A reference to where operations execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Local { path: PathBuf },
    Remote {
        host: String,
        user: Option<String>,
        path: PathBuf,
    },
}

impl Target {
    pub fn is_remote(&self) -> bool {
        matches!(self, Target::Remote { .. })
    }

    pub fn base_path(&self) -> &Path {
        match self {
            Target::Local { path } => path,
            Target::Remote { path, .. } => path,
        }
    }

    /// Parse per the precedence rules: user@host, host:path (not a Windows
    /// drive letter), leading path markers, existing local directory,
    /// localhost special-case, bare hostname fallback.
    pub fn parse(
        target_str: &str,
        default_path: &Path,
        force_local: bool,
        force_remote: bool,
    ) -> Result<Self> {
        if force_local && force_remote {
            return Err(AppDeployError::Input(
                "cannot specify both local and remote".to_string(),
            ));
        }

        // user@host[:path]
        if target_str.contains('@') && !force_local {
            let (user_host, path_str) = match target_str.split_once(':') {
                Some((a, b)) => (a, Some(b)),
                None => (target_str, None),
            };
            let (user, host) = match user_host.rsplit_once('@') {
                Some((u, h)) => (if u.is_empty() { None } else { Some(u.to_string()) }, h),
                None => (None, user_host),
            };
            let path = match path_str {
                Some(p) if !p.is_empty() => PathBuf::from(p),
                _ => default_path.to_path_buf(),
            };
            return Ok(Target::Remote {
                host: host.to_string(),
                user,
                path,
            });
        }

        // host:path, excluding a single-letter Windows drive (`C:\...`)
        if let Some(colon_pos) = target_str.find(':') {
            if !force_local {
                let is_windows_drive = colon_pos == 1
                    && target_str
                        .chars()
                        .next()
                        .map(|c| c.is_ascii_alphabetic())
                        .unwrap_or(false);
                if is_windows_drive {
                    if !force_remote {
                        return Ok(Target::Local {
                            path: PathBuf::from(target_str),
                        });
                    }
                } else {
                    let (host, path_str) = target_str.split_at(colon_pos);
                    let path_str = &path_str[1..];
                    let path = if path_str.is_empty() {
                        default_path.to_path_buf()
                    } else {
                        PathBuf::from(path_str)
                    };
                    return Ok(Target::Remote {
                        host: host.to_string(),
                        user: None,
                        path,
                    });
                }
            }
        }

        if force_remote {
            return Ok(Target::Remote {
                host: target_str.to_string(),
                user: None,
                path: default_path.to_path_buf(),
            });
        }

        if target_str.starts_with('/')
            || target_str.starts_with("./")
            || target_str.starts_with("../")
            || target_str.starts_with('~')
        {
            return Ok(Target::Local {
                path: expand_tilde(target_str),
            });
        }

        if Path::new(target_str).exists() {
            return Ok(Target::Local {
                path: PathBuf::from(target_str),
            });
        }

        if target_str == "localhost" || target_str == "127.0.0.1" {
            return Ok(Target::Local {
                path: default_path.to_path_buf(),
            });
        }

        if force_local {
            return Ok(Target::Local {
                path: PathBuf::from(target_str),
            });
        }

        Ok(Target::Remote {
            host: target_str.to_string(),
            user: None,
            path: default_path.to_path_buf(),
        })
    }

    pub fn display(&self) -> String {
        match self {
            Target::Local { path } => path.display().to_string(),
            Target::Remote {
                host,
                user: Some(user),
                path,
            } => format!("{user}@{host}:{}", path.display()),
            Target::Remote { host, path, .. } => format!("{host}:{}", path.display()),
        }
    }
}

fn expand_tilde(path_str: &str) -> PathBuf {
    if let Some(rest) = path_str.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            let rest = rest.strip_prefix('/').unwrap_or(rest);
            return if rest.is_empty() { home } else { home.join(rest) };
        }
    }
    PathBuf::from(path_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_path() -> PathBuf {
        PathBuf::from("/srv/apps")
    }

    #[test]
    fn parses_user_at_host_with_path() {
        let t = Target::parse("deploy@example.com:/opt/apps", &default_path(), false, false)
            .unwrap();
        assert_eq!(
            t,
            Target::Remote {
                host: "example.com".to_string(),
                user: Some("deploy".to_string()),
                path: PathBuf::from("/opt/apps"),
            }
        );
    }

    #[test]
    fn parses_host_colon_relative_path() {
        let t = Target::parse("host:relative", &default_path(), false, false).unwrap();
        assert_eq!(
            t,
            Target::Remote {
                host: "host".to_string(),
                user: None,
                path: PathBuf::from("relative"),
            }
        );
    }

    #[test]
    fn windows_drive_letter_is_local_not_remote() {
        let t = Target::parse("C:\\foo", &default_path(), false, false).unwrap();
        assert_eq!(
            t,
            Target::Local {
                path: PathBuf::from("C:\\foo"),
            }
        );
    }

    #[test]
    fn dot_slash_is_local() {
        let t = Target::parse("./dir", &default_path(), false, false).unwrap();
        assert_eq!(
            t,
            Target::Local {
                path: PathBuf::from("./dir"),
            }
        );
    }

    #[test]
    fn bare_localhost_uses_default_path() {
        let t = Target::parse("localhost", &default_path(), false, false).unwrap();
        assert_eq!(
            t,
            Target::Local {
                path: default_path(),
            }
        );
    }

    #[test]
    fn bare_hostname_is_remote() {
        let t = Target::parse("myhost", &default_path(), false, false).unwrap();
        assert_eq!(
            t,
            Target::Remote {
                host: "myhost".to_string(),
                user: None,
                path: default_path(),
            }
        );
    }

    #[test]
    fn force_local_and_remote_is_error() {
        assert!(Target::parse("x", &default_path(), true, true).is_err());
    }

    #[test]
    fn parsing_is_pure() {
        let a = Target::parse("user@host:/path", &default_path(), false, false).unwrap();
        let b = Target::parse("user@host:/path", &default_path(), false, false).unwrap();
        assert_eq!(a, b);
    }
}
