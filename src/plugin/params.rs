//! Typed parameter registry
//!
//! The plugin exposes a single switch, but it is still reached through a
//! registry so hosts and persisted state address it by id.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::constants::{IN_OUT_PARAM_ID, IN_OUT_PARAM_NAME};

/// A boolean parameter. Reads are atomic and safe from the audio thread.
#[derive(Debug)]
pub struct BoolParam {
    id: &'static str,
    name: &'static str,
    default: bool,
    value: AtomicBool,
}

impl BoolParam {
    pub fn new(id: &'static str, name: &'static str, default: bool) -> Self {
        Self {
            id,
            name,
            default,
            value: AtomicBool::new(default),
        }
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn default_value(&self) -> bool {
        self.default
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    /// Store `value`, returning whether it changed
    fn replace(&self, value: bool) -> bool {
        self.value.swap(value, Ordering::AcqRel) != value
    }
}

/// Callback fired on the thread that changed a parameter
pub type ParamListener = Box<dyn Fn(&str, bool) + Send + Sync>;

pub struct ParamRegistry {
    in_out: Arc<BoolParam>,
    listeners: RwLock<Vec<ParamListener>>,
}

impl ParamRegistry {
    pub fn new() -> Self {
        Self {
            in_out: Arc::new(BoolParam::new(IN_OUT_PARAM_ID, IN_OUT_PARAM_NAME, false)),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// The Send/Receive switch: true = send
    pub fn in_out(&self) -> &Arc<BoolParam> {
        &self.in_out
    }

    /// Look a boolean parameter up by id
    pub fn bool_param(&self, id: &str) -> Option<&Arc<BoolParam>> {
        (id == self.in_out.id()).then_some(&self.in_out)
    }

    /// Set a parameter and notify listeners if its value changed.
    /// Returns false for an unknown id or an unchanged value.
    pub fn set_bool(&self, id: &str, value: bool) -> bool {
        let Some(param) = self.bool_param(id) else {
            tracing::warn!("Unknown parameter {:?}", id);
            return false;
        };
        if !param.replace(value) {
            return false;
        }

        tracing::info!(
            "{} parameter changed to {}",
            param.id(),
            if value { "Sender" } else { "Receiver" }
        );
        for listener in self.listeners.read().iter() {
            listener(param.id(), value);
        }
        true
    }

    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&str, bool) + Send + Sync + 'static,
    {
        self.listeners.write().push(Box::new(listener));
    }

    pub fn clear_listeners(&self) {
        self.listeners.write().clear();
    }

    /// Every parameter value by id
    pub fn values(&self) -> BTreeMap<String, bool> {
        BTreeMap::from([(self.in_out.id().to_string(), self.in_out.get())])
    }
}

impl Default for ParamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
