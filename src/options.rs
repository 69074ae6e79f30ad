use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use structopt::StructOpt;

/// Switches for the admission policy API
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AdmissionOptions {
    pub enable: bool,
    pub enable_gatekeeper_provider: bool,
}

impl Default for AdmissionOptions {
    fn default() -> Self {
        Self {
            enable: false,
            enable_gatekeeper_provider: true,
        }
    }
}

impl AdmissionOptions {
    /// Returns every problem found, empty when the options are usable
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.enable_gatekeeper_provider && !self.enable {
            errors.push("the gatekeeper provider is enabled but admission is disabled".to_string());
        }
        errors
    }
}

/// Layout of the YAML configuration file
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigFile {
    pub admission: AdmissionOptions,
}

impl ConfigFile {
    pub fn parse(data: &str) -> Result<Self> {
        serde_yaml::from_str(data).context("Failed to parse configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::parse(&data)
    }
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "kubesphere-admission",
    about = "Serve the KubeSphere admission policy API"
)]
pub struct ServerOptions {
    /// YAML configuration file with an `admission` section
    #[structopt(long, parse(from_os_str))]
    pub config: Option<PathBuf>,

    /// Serve the admission policy API
    #[structopt(long = "admission-enable")]
    pub admission_enable: bool,

    /// Register the Gatekeeper provider
    #[structopt(long = "admission-enable-gatekeeper-provider")]
    pub admission_enable_gatekeeper_provider: Option<bool>,

    #[structopt(long, env = "PORT", default_value = "9090")]
    pub port: u16,

    /// PEM certificate, the server falls back to plain HTTP without one
    #[structopt(long, env = "TLS_CERT_PATH", parse(from_os_str))]
    pub tls_cert: Option<PathBuf>,

    #[structopt(long, env = "TLS_KEY_PATH", parse(from_os_str))]
    pub tls_key: Option<PathBuf>,
}

impl ServerOptions {
    /// Options from the configuration file, overridden by the flags
    pub fn admission_options(&self) -> Result<AdmissionOptions> {
        let mut options = match &self.config {
            Some(path) => ConfigFile::load(path)?.admission,
            None => AdmissionOptions::default(),
        };
        self.apply_flags(&mut options);
        Ok(options)
    }

    fn apply_flags(&self, options: &mut AdmissionOptions) {
        if self.admission_enable {
            options.enable = true;
        }
        if let Some(enable) = self.admission_enable_gatekeeper_provider {
            options.enable_gatekeeper_provider = enable;
        }
    }

    /// Certificate and key paths, when both are set and present on disk
    pub fn tls_paths(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) if cert.exists() && key.exists() => {
                Some((cert.clone(), key.clone()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_file() {
        struct TestCase {
            name: &'static str,
            data: &'static str,
            want: AdmissionOptions,
        }

        let cases = vec![
            TestCase {
                name: "empty file",
                data: "{}",
                want: AdmissionOptions::default(),
            },
            TestCase {
                name: "enabled",
                data: "admission:\n  enable: true\n",
                want: AdmissionOptions {
                    enable: true,
                    enable_gatekeeper_provider: true,
                },
            },
            TestCase {
                name: "gatekeeper disabled",
                data: "admission:\n  enable: true\n  enableGatekeeperProvider: false\n",
                want: AdmissionOptions {
                    enable: true,
                    enable_gatekeeper_provider: false,
                },
            },
            TestCase {
                name: "other sections are ignored",
                data: "authentication:\n  jwtSecret: abc\nadmission:\n  enable: true\n",
                want: AdmissionOptions {
                    enable: true,
                    enable_gatekeeper_provider: true,
                },
            },
        ];

        for case in cases {
            let config = ConfigFile::parse(case.data)
                .unwrap_or_else(|e| panic!("{}: {}", case.name, e));
            assert_eq!(config.admission, case.want, "{}", case.name);
        }
    }

    #[test]
    fn test_parse_config_file_rejects_bad_types() {
        assert!(ConfigFile::parse("admission:\n  enable: sometimes\n").is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let opts = ServerOptions::from_iter(vec![
            "kubesphere-admission",
            "--admission-enable",
            "--admission-enable-gatekeeper-provider",
            "false",
            "--port",
            "8080",
        ]);
        assert_eq!(opts.port, 8080);
        assert_eq!(
            opts.admission_options().unwrap(),
            AdmissionOptions {
                enable: true,
                enable_gatekeeper_provider: false,
            }
        );

        let opts = ServerOptions::from_iter(vec!["kubesphere-admission", "--port", "8080"]);
        assert_eq!(opts.admission_options().unwrap(), AdmissionOptions::default());
    }

    #[test]
    fn test_missing_config_file() {
        let opts = ServerOptions::from_iter(vec![
            "kubesphere-admission",
            "--config",
            "/nonexistent/kubesphere.yaml",
        ]);
        assert!(opts.admission_options().is_err());
    }

    #[test]
    fn test_tls_paths_require_existing_files() {
        let opts = ServerOptions::from_iter(vec![
            "kubesphere-admission",
            "--tls-cert",
            "/nonexistent/tls.crt",
            "--tls-key",
            "/nonexistent/tls.key",
        ]);
        assert_eq!(opts.tls_paths(), None);
    }

    #[test]
    fn test_validate() {
        struct TestCase {
            name: &'static str,
            options: AdmissionOptions,
            want_errors: usize,
        }

        let cases = vec![
            TestCase {
                name: "defaults",
                options: AdmissionOptions::default(),
                want_errors: 1,
            },
            TestCase {
                name: "enabled",
                options: AdmissionOptions {
                    enable: true,
                    enable_gatekeeper_provider: true,
                },
                want_errors: 0,
            },
            TestCase {
                name: "all disabled",
                options: AdmissionOptions {
                    enable: false,
                    enable_gatekeeper_provider: false,
                },
                want_errors: 0,
            },
        ];

        for case in cases {
            assert_eq!(case.options.validate().len(), case.want_errors, "{}", case.name);
        }
    }
}
