use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::{config::AppConfig, server::utils::signature_utils::KeyUrlSigner};

use super::{
    dlhd_services::{DlhdService, DlhdSettings, DynDlhdService},
    manifest_services::{DynManifestService, ManifestService},
    proxy_pool_services::ProxyPool,
    transport_services::{
        DynHttpExecutor, DynTransportClient, ReqwestExecutor, TransportClient, TransportState,
    },
};

/// everything the routes need, cloned into each request through an Extension
#[derive(Clone)]
pub struct EdgeServices {
    pub transport: DynTransportClient,
    pub dlhd: DynDlhdService,
    pub manifests: DynManifestService,
    pub key_signer: Option<Arc<KeyUrlSigner>>,
    pub config: Arc<AppConfig>,
}

impl EdgeServices {
    pub fn new(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let executor = Arc::new(ReqwestExecutor::new().context("failed to build http clients")?)
            as DynHttpExecutor;

        Ok(Self::with_executor(config, executor))
    }

    /// same wiring over any executor, tests hand in a fake upstream here
    pub fn with_executor(config: Arc<AppConfig>, executor: DynHttpExecutor) -> Self {
        info!("starting edge services...");

        let pool = Arc::new(ProxyPool::new(config.proxy_pool.clone()));
        info!(
            "proxy pool has {} endpoints, env proxy {}",
            pool.len(),
            if config.proxy.is_some() { "set" } else { "not set" }
        );

        let transport = Arc::new(TransportClient::new(
            executor,
            Arc::new(TransportState::new()),
            pool,
            config.proxy.clone(),
        ));

        let key_signer = config
            .key_signing_secret
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|secret| Arc::new(KeyUrlSigner::new(secret.clone())));
        if key_signer.is_none() {
            info!("KEY_SIGNING_SECRET not set, key route is unsigned");
        }

        let dlhd = Arc::new(DlhdService::new(
            transport.clone(),
            DlhdSettings::from_config(&config),
        )) as DynDlhdService;

        let manifests = Arc::new(ManifestService::new(transport.clone(), key_signer.clone()))
            as DynManifestService;

        Self {
            transport,
            dlhd,
            manifests,
            key_signer,
            config,
        }
    }
}
