// Backend registry: maps the config's `type` value to a driver constructor.
// Built explicitly at startup and passed into the binding; no hidden globals.
use std::collections::BTreeMap;

use crate::core::config::ParamTree;
use crate::core::error::{Error, ErrorKind};
use crate::driver::null::NullDriver;
use crate::driver::{DriverResult, FittedDriverData, ForwardDriver};

pub type DriverConstructor =
    Box<dyn Fn(&ParamTree, FittedDriverData) -> DriverResult<Box<dyn ForwardDriver>> + Send + Sync>;

#[derive(Default)]
pub struct FactoryRegistry {
    constructors: BTreeMap<String, DriverConstructor>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in diagnostic backend.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("null", |config, data| {
            Ok(Box::new(NullDriver::new(config, data)?) as Box<dyn ForwardDriver>)
        });
        registry
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&ParamTree, FittedDriverData) -> DriverResult<Box<dyn ForwardDriver>>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(kind.into(), Box::new(constructor));
    }

    pub fn backends(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn make_driver(
        &self,
        config: &ParamTree,
        data: FittedDriverData,
    ) -> DriverResult<Box<dyn ForwardDriver>> {
        let kind = config.get("type").ok_or_else(|| {
            Error::new(ErrorKind::Driver)
                .with_message("configuration is missing the driver \"type\" key")
        })?;
        let constructor = self.constructors.get(kind).ok_or_else(|| {
            let known: Vec<&str> = self.backends().collect();
            Error::new(ErrorKind::Driver)
                .with_message(format!("no backend registered for driver type \"{kind}\""))
                .with_hint(format!("registered backends: {}", known.join(", ")))
        })?;
        constructor(config, data)
    }
}
