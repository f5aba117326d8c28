//! Runner module
//!
//! Wires configuration, backends, execution context, pipeline and audit log
//! together for a host application.

use crate::audit_log::AuditLog;
use crate::config::Config;
use crate::context::LocalExecutionContext;
use crate::deploy::{BytecodeFormatter, DeploymentOrchestrator};
use crate::pipeline::{ConfirmationHooks, ExecutionResult, TransactionPipeline};
use crate::providers::{
    InjectedProvider, PlainTransferExecutor, Provider, ProviderKind, ProviderRegistry,
    RemoteNodeProvider, SimulatedProvider,
};
use crate::transaction::TransactionIntent;
use crate::wallet::SecureWallet;
use crate::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Composition root for a transaction session
pub struct TxRunner {
    config: Config,
    context: Arc<LocalExecutionContext>,
    pipeline: Arc<TransactionPipeline>,
}

impl TxRunner {
    /// Build the three well-known backends from `config`
    pub fn from_config(config: Config) -> Result<Self> {
        let simulated = SimulatedProvider::new(
            Arc::new(PlainTransferExecutor),
            config.simulated.accounts,
            config.simulated.initial_ether,
        );

        let wallet = match config.rpc.signer_key() {
            Some(key) => {
                let wallet = SecureWallet::from_secret(&key)?;
                info!(address = %wallet.address(), "Loaded injected signing agent");
                Some(Arc::new(wallet))
            }
            None => {
                warn!(
                    variable = %config.rpc.signer_key_env,
                    "No injected signer key set - injected provider is read-only"
                );
                None
            }
        };
        let injected = InjectedProvider::connect(&config.rpc.injected_url, wallet)?;
        let remote_node = RemoteNodeProvider::connect(&config.rpc.remote_node_url)?;

        Ok(Self::with_providers(
            config,
            Arc::new(simulated),
            Arc::new(injected),
            Arc::new(remote_node),
        ))
    }

    /// Build a runner over caller-supplied backends
    pub fn with_providers(
        config: Config,
        simulated: Arc<dyn Provider>,
        injected: Arc<dyn Provider>,
        remote_node: Arc<dyn Provider>,
    ) -> Self {
        let registry = Arc::new(ProviderRegistry::new(simulated, injected, remote_node));
        let context = Arc::new(LocalExecutionContext::new(
            registry.clone(),
            config.provider.clone(),
        ));
        let pipeline = TransactionPipeline::new(registry, context.clone())
            .with_sender_fallback(config.sender_fallback)
            .with_event_capacity(config.event_capacity);

        info!(
            provider = %config.provider,
            sender_fallback = ?config.sender_fallback,
            "Transaction runner ready"
        );

        Self {
            config,
            context,
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &Arc<LocalExecutionContext> {
        &self.context
    }

    pub fn pipeline(&self) -> &Arc<TransactionPipeline> {
        &self.pipeline
    }

    /// Switch the active backend
    pub fn select_provider(&self, name: &str) {
        if ProviderKind::from_name(name).is_none() && self.context.registry().get(name).is_none() {
            warn!(provider = name, "Unknown provider selected, remote-node will be used");
        }
        self.context.select(name);
    }

    /// Submit `intent` with the configured session defaults
    pub async fn submit(
        &self,
        intent: TransactionIntent,
        hooks: &dyn ConfirmationHooks,
    ) -> Result<ExecutionResult> {
        self.pipeline
            .submit(intent, &self.config.defaults, hooks)
            .await
    }

    /// Raw send with the configured session defaults; refused on mainnet
    pub async fn send_transaction(
        &self,
        intent: TransactionIntent,
        hooks: &dyn ConfirmationHooks,
    ) -> Result<ExecutionResult> {
        self.pipeline
            .send_transaction(intent, &self.config.defaults, hooks)
            .await
    }

    pub fn deployer(&self, formatter: Arc<dyn BytecodeFormatter>) -> DeploymentOrchestrator {
        DeploymentOrchestrator::new(self.pipeline.clone(), formatter)
            .with_max_depth(self.config.max_link_depth)
    }

    /// Start appending pipeline notifications to the configured audit log
    pub fn start_audit_log(&self) -> Option<JoinHandle<()>> {
        let path = self.config.audit_log_path.as_ref()?;
        info!(path = %path, "Audit log enabled");
        Some(AuditLog::new(path).spawn(self.pipeline.subscribe()))
    }
}
