use std::{
    collections::HashMap,
    net::{SocketAddr, ToSocketAddrs},
};

use clap::{Arg, Command};
use conveyor_network::ConnectRetry;
use conveyor_timing::Nanos;

use crate::ConnectorError;

/// Everything the engine needs to identify a session, passed by value to
/// the connector constructor.
#[derive(Clone, Debug)]
pub struct ConnectorConfig {
    pub host: String,
    pub port: u16,
    pub version: String,
    pub cookie: String,
    pub program: String,
    pub instance: String,
    pub retry: ConnectRetry,
}

impl ConnectorConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        version: impl Into<String>,
        cookie: impl Into<String>,
        program: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            version: version.into(),
            cookie: cookie.into(),
            program: program.into(),
            instance: instance.into(),
            retry: ConnectRetry::default(),
        }
    }

    pub fn with_retry(mut self, retry: ConnectRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConnectorError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                ConnectorError::Config(format!("cannot resolve {}:{}", self.host, self.port))
            })
    }
}

/// Connector role inside an application descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Source,
    Sink,
}

/// One source or sink endpoint an application exposes. Codecs are typed and
/// therefore supplied where the socket is built, not here.
#[derive(Clone, Debug)]
pub struct ConnectorEntry {
    pub role: Role,
    pub name: String,
    pub port: u16,
}

/// The application's declared connector endpoints.
#[derive(Clone, Debug, Default)]
pub struct AppDescriptor {
    entries: Vec<ConnectorEntry>,
}

impl AppDescriptor {
    pub fn new(entries: Vec<ConnectorEntry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, entry: ConnectorEntry) {
        self.entries.push(entry);
    }

    pub fn lookup(&self, role: Role, name: &str) -> Result<&ConnectorEntry, ConnectorError> {
        self.entries
            .iter()
            .find(|e| e.role == role && e.name == name)
            .ok_or_else(|| {
                ConnectorError::Config(format!("no {role:?} connector named {name:?}"))
            })
    }
}

/// Parameter names a connector accepts on the command line, each surfaced
/// as `--<connector>-<key>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParamSpec<'a> {
    pub required: &'a [&'a str],
    pub optional: &'a [&'a str],
}

/// Parsed per-connector parameters with typed lookups. Unrelated arguments
/// are tolerated so several connectors can share one argument vector.
#[derive(Clone, Debug)]
pub struct ConnectorParams {
    connector: String,
    values: HashMap<String, String>,
}

impl ConnectorParams {
    /// Parses `args` (the full argv, program name included) against the
    /// enumerated parameter names.
    pub fn parse<I, S>(
        connector: &str,
        spec: &ParamSpec<'_>,
        args: I,
    ) -> Result<Self, ConnectorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cmd = Command::new("connector")
            .ignore_errors(true)
            .disable_help_flag(true)
            .disable_version_flag(true);
        for key in spec.required.iter().chain(spec.optional) {
            cmd = cmd.arg(
                Arg::new((*key).to_owned())
                    .long(format!("{connector}-{key}"))
                    .num_args(1),
            );
        }
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let matches = cmd
            .try_get_matches_from(args)
            .map_err(|e| ConnectorError::Config(e.to_string()))?;

        let mut values = HashMap::new();
        for key in spec.required.iter().chain(spec.optional) {
            if let Some(value) = matches.get_one::<String>(key) {
                values.insert((*key).to_owned(), value.clone());
            }
        }
        for key in spec.required {
            if !values.contains_key(*key) {
                return Err(ConnectorError::Config(format!(
                    "missing required parameter --{connector}-{key}"
                )));
            }
        }
        Ok(Self { connector: connector.to_owned(), values })
    }

    pub fn connector(&self) -> &str {
        &self.connector
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str, ConnectorError> {
        self.get(key).ok_or_else(|| {
            ConnectorError::Config(format!(
                "missing required parameter --{}-{}",
                self.connector, key
            ))
        })
    }

    pub fn get_u16(&self, key: &str) -> Result<Option<u16>, ConnectorError> {
        self.parse_with(key, str::parse::<u16>)
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ConnectorError> {
        self.parse_with(key, str::parse::<u64>)
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, ConnectorError> {
        self.parse_with(key, str::parse::<f64>)
    }

    /// Duration-valued parameter, e.g. `1s`, `250ms`.
    pub fn get_nanos(&self, key: &str) -> Result<Option<Nanos>, ConnectorError> {
        self.parse_with(key, str::parse::<Nanos>)
    }

    fn parse_with<T, E: std::fmt::Display>(
        &self,
        key: &str,
        parse: impl Fn(&str) -> Result<T, E>,
    ) -> Result<Option<T>, ConnectorError> {
        self.get(key)
            .map(|raw| {
                parse(raw).map_err(|e| {
                    ConnectorError::Config(format!(
                        "invalid value {raw:?} for --{}-{}: {e}",
                        self.connector, key
                    ))
                })
            })
            .transpose()
    }
}
