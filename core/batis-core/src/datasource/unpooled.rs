//! Non-pooled data source: one new physical connection per request.

use super::{
    parse_property, Connection, DataSource, DataSourceFactory, Driver, IsolationLevel,
    DRIVER_PROPERTY_PREFIX,
};
use crate::error::{BatisError, BatisResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Connection settings applied to every physical connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Extra driver properties passed through to [`Driver::connect`].
    pub driver_properties: HashMap<String, String>,
    pub auto_commit: Option<bool>,
    pub default_isolation: Option<IsolationLevel>,
    #[serde(with = "crate::datasource::pooled::config::opt_millis")]
    pub default_network_timeout: Option<Duration>,
}

impl DriverSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

pub struct UnpooledDataSource {
    driver: Arc<dyn Driver>,
    settings: DriverSettings,
}

impl UnpooledDataSource {
    pub fn new(driver: Arc<dyn Driver>, settings: DriverSettings) -> Self {
        Self { driver, settings }
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut DriverSettings {
        &mut self.settings
    }

    /// Opens a physical connection and applies the configured defaults.
    pub fn new_connection(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> BatisResult<Box<dyn Connection>> {
        let mut properties = self.settings.driver_properties.clone();
        if let Some(username) = username {
            properties.insert("user".to_string(), username.to_string());
        }
        if let Some(password) = password {
            properties.insert("password".to_string(), password.to_string());
        }

        let mut conn = self.driver.connect(&self.settings.url, &properties)?;
        if let Err(e) = self.configure(conn.as_mut()) {
            let _ = conn.close();
            return Err(e);
        }
        Ok(conn)
    }

    fn configure(&self, conn: &mut dyn Connection) -> BatisResult<()> {
        if let Some(timeout) = self.settings.default_network_timeout {
            conn.set_network_timeout(timeout)?;
        }
        if let Some(auto_commit) = self.settings.auto_commit {
            if auto_commit != conn.auto_commit()? {
                conn.set_auto_commit(auto_commit)?;
            }
        }
        if let Some(level) = self.settings.default_isolation {
            conn.set_transaction_isolation(level)?;
        }
        Ok(())
    }
}

impl DataSource for UnpooledDataSource {
    fn get_connection(&self) -> BatisResult<Box<dyn Connection>> {
        self.new_connection(
            self.settings.username.as_deref(),
            self.settings.password.as_deref(),
        )
    }

    fn get_connection_as(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> BatisResult<Box<dyn Connection>> {
        self.new_connection(username, password)
    }
}

/// Applies one driver-level property; returns false for unknown keys.
pub(crate) fn apply_driver_property(
    settings: &mut DriverSettings,
    key: &str,
    value: &str,
) -> BatisResult<bool> {
    if let Some(name) = key.strip_prefix(DRIVER_PROPERTY_PREFIX) {
        settings
            .driver_properties
            .insert(name.to_string(), value.to_string());
        return Ok(true);
    }
    match key {
        "url" => settings.url = value.to_string(),
        "username" => settings.username = Some(value.to_string()),
        "password" => settings.password = Some(value.to_string()),
        "autoCommit" => settings.auto_commit = Some(parse_property(key, value)?),
        "defaultTransactionIsolationLevel" => {
            settings.default_isolation = Some(parse_property(key, value)?)
        }
        "defaultNetworkTimeout" => {
            let millis: u64 = parse_property(key, value)?;
            settings.default_network_timeout = Some(Duration::from_millis(millis));
        }
        _ => return Ok(false),
    }
    Ok(true)
}

/// Factory building an [`UnpooledDataSource`] from string properties.
pub struct UnpooledDataSourceFactory {
    driver: Arc<dyn Driver>,
    settings: DriverSettings,
}

impl UnpooledDataSourceFactory {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            settings: DriverSettings::default(),
        }
    }
}

impl DataSourceFactory for UnpooledDataSourceFactory {
    fn set_properties(&mut self, properties: &HashMap<String, String>) -> BatisResult<()> {
        let mut settings = self.settings.clone();
        for (key, value) in properties {
            if !apply_driver_property(&mut settings, key, value)? {
                return Err(BatisError::Config(format!(
                    "unknown data source property: {key}"
                )));
            }
        }
        self.settings = settings;
        Ok(())
    }

    fn data_source(&self) -> Arc<dyn DataSource> {
        Arc::new(UnpooledDataSource::new(
            self.driver.clone(),
            self.settings.clone(),
        ))
    }
}
