use crate::error::{Error, Result};
use crate::gap::types::AdapterState;

/// A change of adapter state, reported as (old, new)
pub type Transition = (AdapterState, AdapterState);

/// Adapter power state machine
///
/// ```text
/// Disabled --enable()--> Enabling --(enabled event)--> Enabled
/// Enabled --disable()--> Disabling --(disabled event)--> Disabled
/// ```
///
/// A "disabled" report in any state other than `Disabled` forces the adapter
/// to `Disabled`; the caller is responsible for tearing down scan and
/// connection state when that happens.
#[derive(Debug, Default)]
pub struct AdapterLifecycle {
    state: AdapterState,
}

impl AdapterLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state == AdapterState::Enabled
    }

    pub fn require_enabled(&self) -> Result<()> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(Error::AdapterNotEnabled)
        }
    }

    /// Handles an enable request. Returns `true` when the transport must be
    /// asked to power on, `false` when the adapter is already on or powering on.
    pub fn request_enable(&mut self) -> Result<bool> {
        match self.state {
            AdapterState::Disabled => {
                self.state = AdapterState::Enabling;
                Ok(true)
            }
            AdapterState::Enabling | AdapterState::Enabled => Ok(false),
            AdapterState::Disabling => Err(Error::AdapterBusy),
        }
    }

    /// Handles a disable request. Returns `true` when the transport must be
    /// asked to power off.
    pub fn request_disable(&mut self) -> Result<bool> {
        match self.state {
            AdapterState::Disabled | AdapterState::Disabling => Ok(false),
            AdapterState::Enabling | AdapterState::Enabled => {
                self.state = AdapterState::Disabling;
                Ok(true)
            }
        }
    }

    /// Puts back the state a refused request moved away from
    pub fn rollback(&mut self, previous: AdapterState) {
        self.state = previous;
    }

    /// The stack finished powering on and registered the client
    pub fn on_enabled(&mut self) -> Option<Transition> {
        match self.state {
            AdapterState::Disabled | AdapterState::Enabling => {
                let old = std::mem::replace(&mut self.state, AdapterState::Enabled);
                Some((old, AdapterState::Enabled))
            }
            AdapterState::Enabled | AdapterState::Disabling => None,
        }
    }

    /// The radio reported a power change. Powering on is only an intermediate
    /// step (the enabled event follows), so only power-off changes state here.
    pub fn on_power_changed(&mut self, powered: bool) -> Option<Transition> {
        if powered || self.state == AdapterState::Disabled {
            return None;
        }
        let old = std::mem::replace(&mut self.state, AdapterState::Disabled);
        Some((old, AdapterState::Disabled))
    }
}
