// =============================================================================
// Registration Gate — `{name, whatsapp}` record checked before the engine runs
// =============================================================================

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::storage::SlotStore;
use crate::types::Registration;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("whatsapp contact must not be empty")]
    EmptyWhatsapp,

    #[error("failed to persist registration: {0}")]
    Storage(#[from] anyhow::Error),
}

pub struct RegistrationGate {
    store: Arc<dyn SlotStore>,
    key: String,
}

impl RegistrationGate {
    pub fn new(store: Arc<dyn SlotStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Stored registration. A missing or malformed slot counts as absent.
    pub fn current(&self) -> Option<Registration> {
        let raw = match self.store.read(&self.key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %self.key, error = %e, "registration slot unreadable");
                return None;
            }
        };
        serde_json::from_str(&raw).ok()
    }

    pub fn is_registered(&self) -> bool {
        self.current().is_some()
    }

    pub fn register(&self, name: &str, whatsapp: &str) -> Result<Registration, RegistrationError> {
        let name = name.trim();
        let whatsapp = whatsapp.trim();
        if name.is_empty() {
            return Err(RegistrationError::EmptyName);
        }
        if whatsapp.is_empty() {
            return Err(RegistrationError::EmptyWhatsapp);
        }

        let registration = Registration {
            name: name.to_string(),
            whatsapp: whatsapp.to_string(),
        };
        let payload = serde_json::to_string(&registration).map_err(anyhow::Error::from)?;
        self.store.write(&self.key, &payload)?;

        info!(name = %registration.name, "user registered");
        Ok(registration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySlotStore;

    fn gate() -> (Arc<MemorySlotStore>, RegistrationGate) {
        let slots = Arc::new(MemorySlotStore::new());
        (slots.clone(), RegistrationGate::new(slots, "aviator_user"))
    }

    #[test]
    fn unregistered_by_default() {
        let (_, gate) = gate();
        assert!(!gate.is_registered());
        assert!(gate.current().is_none());
    }

    #[test]
    fn register_trims_and_persists() {
        let (slots, gate) = gate();
        let reg = gate.register("  Ana ", " +55 11 99999-0000 ").unwrap();
        assert_eq!(reg.name, "Ana");
        assert_eq!(reg.whatsapp, "+55 11 99999-0000");
        assert!(gate.is_registered());
        assert_eq!(gate.current(), Some(reg));

        let raw = slots.read("aviator_user").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["name"], "Ana");
        assert_eq!(value["whatsapp"], "+55 11 99999-0000");
    }

    #[test]
    fn blank_fields_are_rejected() {
        let (_, gate) = gate();
        assert!(matches!(gate.register("   ", "123"), Err(RegistrationError::EmptyName)));
        assert!(matches!(gate.register("Ana", ""), Err(RegistrationError::EmptyWhatsapp)));
        assert!(!gate.is_registered());
    }

    #[test]
    fn malformed_record_is_unregistered() {
        let (slots, gate) = gate();
        slots.write("aviator_user", "not json").unwrap();
        assert!(!gate.is_registered());
    }
}
