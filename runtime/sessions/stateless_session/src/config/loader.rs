use std::{path::PathBuf, str::FromStr};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::de::DeserializeOwned;

static PROFILE_ENV_VAR: &str = "SESSION_PROFILE";
static ENV_PREFIX: &str = "SESSION_";

/// Configuration profiles determine which configuration file is loaded
/// on top of `base.yml`.
///
/// The value returned by `as_ref()` is used as the name of the profile-specific configuration file.
pub trait ConfigProfile:
    FromStr<Err: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static> + AsRef<str>
{
    /// Load and parse the configuration profile out of the `SESSION_PROFILE` environment variable.
    fn load() -> Result<Self, errors::ConfigProfileLoadError> {
        let profile = std::env::var(PROFILE_ENV_VAR).context(
            "Failed to load the configuration profile: the environment variable `SESSION_PROFILE` is either not set or set to a value that contains invalid UTF-8"
        ).map_err(errors::ConfigProfileLoadError)?;
        Self::from_str(&profile)
            .map_err(|e| {
                anyhow::anyhow!(e).context(format!(
                    "Failed to parse the configuration profile from the `{PROFILE_ENV_VAR}` environment variable"
                ))
            })
            .map_err(errors::ConfigProfileLoadError)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The configuration profiles known out of the box.
pub enum Profile {
    /// `dev`: local development.
    Development,
    /// `prod`: production deployments.
    Production,
}

impl FromStr for Profile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Profile::Development),
            "prod" => Ok(Profile::Production),
            _ => anyhow::bail!("Unknown profile: {}", s),
        }
    }
}

impl AsRef<str> for Profile {
    fn as_ref(&self) -> &str {
        match self {
            Profile::Development => "dev",
            Profile::Production => "prod",
        }
    }
}

impl ConfigProfile for Profile {}

#[derive(Clone, Debug)]
/// Load a configuration type, usually [`SessionConfig`](super::SessionConfig),
/// out of configuration files and environment variables.
///
/// # Example
///
/// ```rust,no_run
/// use stateless_session::SessionConfig;
/// use stateless_session::config::{ConfigLoader, Profile};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config: SessionConfig = ConfigLoader::new()
///     .profile(Profile::Production)
///     .load()?;
/// # Ok(())
/// # }
/// ```
pub struct ConfigLoader<P = Profile> {
    configuration_dir: Option<PathBuf>,
    profile: Option<P>,
}

impl<P> ConfigLoader<P>
where
    P: ConfigProfile,
{
    /// Initialize a new [`ConfigLoader`] instance.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            configuration_dir: None,
            profile: None,
        }
    }

    /// Specify the profile manually, rather than loading it
    /// from the `SESSION_PROFILE` environment variable.
    pub fn profile(mut self, profile: P) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Specify the path to the directory where configuration files are stored.
    ///
    /// By default, configuration files are looked up under `configuration/`,
    /// relative to the current working directory.
    pub fn configuration_dir<Dir>(mut self, dir: Dir) -> Self
    where
        Dir: Into<PathBuf>,
    {
        self.configuration_dir = Some(dir.into());
        self
    }

    /// Load the configuration by merging together three sources:
    ///
    /// 1. Environment variables (`SESSION_*`)
    /// 2. Profile-specific configuration file (`{configuration_dir}/{profile}.yml`)
    /// 3. Base configuration file (`{configuration_dir}/base.yml`)
    ///
    /// The list above is ordered by precedence.
    /// Nested fields are set via environment variables using `__` as separator:
    /// `SESSION_COOKIE__NAME` sets `cookie.name`.
    pub fn load<Config>(self) -> Result<Config, errors::ConfigLoadError>
    where
        Config: DeserializeOwned,
    {
        let profile = match self.profile {
            Some(profile) => profile,
            None => P::load().map_err(|e| errors::ConfigLoadError(e.into()))?,
        };
        let configuration_dir = self
            .configuration_dir
            .unwrap_or_else(|| PathBuf::from("configuration"));
        let span = tracing::info_span!(
            "Loading session configuration",
            configuration.directory = %configuration_dir.display(),
            configuration.profile = %profile.as_ref(),
        );
        let _guard = span.enter();
        let base_filepath = configuration_dir.join("base.yml");
        let profile_filepath = configuration_dir.join(format!("{}.yml", profile.as_ref()));

        // `SESSION_PROFILE` selects the profile, it isn't a configuration value.
        let env_source = Env::prefixed(ENV_PREFIX).split("__").ignore(&["PROFILE"]);
        let figment = Figment::new()
            .merge(Yaml::file(base_filepath))
            .merge(Yaml::file(profile_filepath))
            .merge(env_source);

        let configuration: Config = figment
            .extract()
            .context("Failed to load hierarchical configuration")
            .map_err(errors::ConfigLoadError)?;
        Ok(configuration)
    }
}

/// Errors that can occur when loading configuration.
pub mod errors {
    #[derive(Debug, thiserror::Error)]
    #[error("Failed to load configuration")]
    /// The error returned by [`ConfigLoader::load`](super::ConfigLoader::load).
    pub struct ConfigLoadError(#[source] pub(super) anyhow::Error);

    #[derive(Debug, thiserror::Error)]
    #[error(transparent)]
    /// The error returned by [`ConfigProfile::load`](super::ConfigProfile::load).
    pub struct ConfigProfileLoadError(pub(super) anyhow::Error);
}
