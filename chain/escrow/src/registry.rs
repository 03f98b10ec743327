//! Adapter Registry: per-asset yield routing and delegate trust checks
//!
//! Maps an underlying asset to the adapter delegate and yield target used to
//! convert it, with a default route for assets that have no override. A
//! delegate is trusted only when it is non-null, whitelisted (if the
//! whitelist is enabled) and backed by adapter code at the host. The check
//! runs on every configuration change and again at every use site.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use types::ids::Address;

use crate::adapter::YieldAdapter;
use crate::errors::RegistryError;
use crate::host::Host;

/// Adapter configuration for one underlying asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterRoute {
    pub delegate: Address,
    pub target: Address,
    /// Adapter-specific key for the asset (empty for the default route)
    pub asset_key: String,
}

#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    default_delegate: Option<Address>,
    default_target: Option<Address>,
    /// Per-asset overrides keyed by underlying asset
    token_configs: HashMap<Address, AdapterRoute>,
    whitelist: HashSet<Address>,
    whitelist_enabled: bool,
}

impl AdapterRegistry {
    pub fn new(whitelist_enabled: bool) -> Self {
        Self {
            whitelist_enabled,
            ..Self::default()
        }
    }

    // ───────────────────────── Trust check ─────────────────────────

    /// Validate `delegate` and load its adapter code from the host.
    pub fn validate_delegate(
        &self,
        host: &dyn Host,
        delegate: &Address,
    ) -> Result<Arc<dyn YieldAdapter>, RegistryError> {
        if delegate.is_zero() {
            return Err(RegistryError::ZeroAddress { field: "delegate" });
        }
        if self.whitelist_enabled && !self.whitelist.contains(delegate) {
            return Err(RegistryError::DelegateNotWhitelisted {
                delegate: *delegate,
            });
        }
        host.adapter_at(delegate)
            .ok_or(RegistryError::DelegateHasNoCode {
                delegate: *delegate,
            })
    }

    // ───────────────────────── Configuration ─────────────────────────

    /// Set the default delegate. Returns the previous one.
    pub fn set_default_delegate(
        &mut self,
        host: &dyn Host,
        delegate: Address,
    ) -> Result<Option<Address>, RegistryError> {
        self.validate_delegate(host, &delegate)?;
        Ok(self.default_delegate.replace(delegate))
    }

    /// Set the default yield target. Returns the previous one.
    pub fn set_default_target(&mut self, target: Address) -> Result<Option<Address>, RegistryError> {
        if target.is_zero() {
            return Err(RegistryError::ZeroAddress { field: "target" });
        }
        Ok(self.default_target.replace(target))
    }

    /// Set the per-asset route for `asset`.
    pub fn set_token_config(
        &mut self,
        host: &dyn Host,
        asset: Address,
        route: AdapterRoute,
    ) -> Result<Option<AdapterRoute>, RegistryError> {
        if asset.is_zero() {
            return Err(RegistryError::ZeroAddress { field: "asset" });
        }
        if route.target.is_zero() {
            return Err(RegistryError::ZeroAddress { field: "target" });
        }
        self.validate_delegate(host, &route.delegate)?;
        Ok(self.token_configs.insert(asset, route))
    }

    /// Add or remove a delegate from the whitelist.
    pub fn set_whitelisted(&mut self, delegate: Address, allowed: bool) -> Result<(), RegistryError> {
        if delegate.is_zero() {
            return Err(RegistryError::ZeroAddress { field: "delegate" });
        }
        if allowed {
            self.whitelist.insert(delegate);
        } else {
            self.whitelist.remove(&delegate);
        }
        Ok(())
    }

    pub fn set_whitelist_enabled(&mut self, enabled: bool) {
        self.whitelist_enabled = enabled;
    }

    // ───────────────────────── Resolution ─────────────────────────

    /// Route for `asset`: its override, else the default route.
    pub fn resolve(&self, asset: &Address) -> Result<AdapterRoute, RegistryError> {
        self.route_for(asset)
            .ok_or(RegistryError::MissingRoute { asset: *asset })
    }

    pub fn route_for(&self, asset: &Address) -> Option<AdapterRoute> {
        if let Some(route) = self.token_configs.get(asset) {
            return Some(route.clone());
        }
        match (self.default_delegate, self.default_target) {
            (Some(delegate), Some(target)) => Some(AdapterRoute {
                delegate,
                target,
                asset_key: String::new(),
            }),
            _ => None,
        }
    }

    /// Resolve the route for `asset` and re-validate its delegate.
    pub fn resolve_adapter(
        &self,
        host: &dyn Host,
        asset: &Address,
    ) -> Result<(AdapterRoute, Arc<dyn YieldAdapter>), RegistryError> {
        let route = self.resolve(asset)?;
        let adapter = self.validate_delegate(host, &route.delegate)?;
        Ok((route, adapter))
    }

    pub fn is_whitelisted(&self, delegate: &Address) -> bool {
        self.whitelist.contains(delegate)
    }

    pub fn whitelist_enabled(&self) -> bool {
        self.whitelist_enabled
    }

    pub fn default_delegate(&self) -> Option<Address> {
        self.default_delegate
    }

    pub fn default_target(&self) -> Option<Address> {
        self.default_target
    }
}
