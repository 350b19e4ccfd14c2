//! Container provisioning for Azure Blob Storage
//!
//! `object_store` reads and writes blobs but has no call for creating a
//! container, so startup issues Create Container itself, signed with the
//! account's shared key.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use reqwest::StatusCode;
use ring::hmac;

use crate::model::Side;
use crate::{Error, Result};

/// Blob service REST version used for provisioning requests.
const API_VERSION: &str = "2023-11-03";

/// Well-known shared key of the local storage emulator.
const EMULATOR_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Overrides the emulator address, as `object_store` does.
const EMULATOR_URL_ENV: &str = "AZURITE_BLOB_STORAGE_URL";
const EMULATOR_URL: &str = "http://127.0.0.1:10000";

/// A container that should exist before the first pass.
#[derive(Debug, Clone)]
pub(crate) struct AzureContainer {
    account: String,
    key: Option<String>,
    container: String,
    emulator: bool,
}

impl AzureContainer {
    pub(crate) fn new(account: &str, key: Option<&str>, container: &str, emulator: bool) -> Self {
        Self {
            account: account.to_string(),
            key: key.map(str::to_string),
            container: container.to_string(),
            emulator,
        }
    }

    /// Container URL; the emulator addresses accounts by path.
    fn url(&self) -> String {
        if self.emulator {
            let base = std::env::var(EMULATOR_URL_ENV).unwrap_or_else(|_| EMULATOR_URL.into());
            format!("{}/{}/{}", base.trim_end_matches('/'), self.account, self.container)
        } else {
            format!("https://{}.blob.core.windows.net/{}", self.account, self.container)
        }
    }

    fn canonical_resource(&self) -> String {
        if self.emulator {
            format!("/{0}/{0}/{1}\nrestype:container", self.account, self.container)
        } else {
            format!("/{}/{}\nrestype:container", self.account, self.container)
        }
    }

    /// Shared Key string-to-sign for an empty-bodied PUT.
    ///
    /// The eleven standard headers between the verb and the `x-ms-*` block
    /// are all empty; a zero content length is signed as the empty string.
    fn string_to_sign(&self, date: &str) -> String {
        format!(
            "PUT{}x-ms-date:{date}\nx-ms-version:{API_VERSION}\n{}",
            "\n".repeat(12),
            self.canonical_resource()
        )
    }

    fn authorization(&self, key: &str, date: &str) -> Result<String> {
        let secret = STANDARD.decode(key).map_err(|e| Error::Config {
            message: format!("remote.account_key is not valid base64: {e}"),
        })?;
        let key = hmac::Key::new(hmac::HMAC_SHA256, &secret);
        let tag = hmac::sign(&key, self.string_to_sign(date).as_bytes());
        Ok(format!("SharedKey {}:{}", self.account, STANDARD.encode(tag.as_ref())))
    }

    /// Create the container unless it already exists.
    ///
    /// Without a shared key (outside the emulator) the container is left to
    /// whoever provisions the account, and the startup check reports it.
    pub(crate) async fn ensure(&self) -> Result<()> {
        let key = match (&self.key, self.emulator) {
            (Some(key), _) => key.as_str(),
            (None, true) => EMULATOR_ACCOUNT_KEY,
            (None, false) => {
                tracing::debug!(container = %self.container, "no account key, not creating container");
                return Ok(());
            }
        };

        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let authorization = self.authorization(key, &date)?;
        let unavailable = |message: String| Error::ReplicaUnavailable {
            side: Side::Remote,
            message,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| unavailable(e.to_string()))?;
        let response = client
            .put(format!("{}?restype=container", self.url()))
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION)
            .header("Authorization", authorization)
            .body("")
            .send()
            .await
            .map_err(|e| unavailable(format!("creating container {}: {e}", self.container)))?;

        match response.status() {
            StatusCode::CREATED => {
                tracing::info!(container = %self.container, "created container");
                Ok(())
            }
            StatusCode::CONFLICT => {
                tracing::debug!(container = %self.container, "container already exists");
                Ok(())
            }
            status => Err(unavailable(format!(
                "creating container {}: {status}",
                self.container
            ))),
        }
    }
}
