//! Markup collaborator boundary.
//!
//! The parser validates UI bindings and event handlers against *some* markup
//! technology without knowing which one. Hosts hand in an implementation of
//! `MarkupProvider`; the bundled `StaticMarkup` is enough for tests and for
//! headless embedders.

use std::collections::HashMap;

pub trait MarkupProvider {
    /// Parse the markup text. An `Err` aborts the whole parse with a single
    /// aggregated diagnostic.
    fn load(&self, markup: &str) -> Result<(), String>;
    /// Names of all addressable elements, in document order.
    fn element_names(&self) -> Vec<String>;
    fn has_element(&self, name: &str) -> bool;
    fn has_property(&self, element: &str, property: &str) -> bool;
    fn has_event(&self, element: &str, event: &str) -> bool;
}

/// A fixed element/property/event table.
#[derive(Debug, Clone, Default)]
pub struct StaticMarkup {
    elements: Vec<String>,
    properties: HashMap<String, Vec<String>>,
    events: HashMap<String, Vec<String>>,
}

impl StaticMarkup {
    pub fn new() -> Self { Self::default() }

    pub fn element(mut self, name: &str, properties: &[&str], events: &[&str]) -> Self {
        self.elements.push(name.to_string());
        self.properties.insert(name.to_string(), properties.iter().map(|s| s.to_string()).collect());
        self.events.insert(name.to_string(), events.iter().map(|s| s.to_string()).collect());
        self
    }
}

impl MarkupProvider for StaticMarkup {
    fn load(&self, _markup: &str) -> Result<(), String> { Ok(()) }

    fn element_names(&self) -> Vec<String> { self.elements.clone() }

    fn has_element(&self, name: &str) -> bool {
        self.elements.iter().any(|e| e == name)
    }

    fn has_property(&self, element: &str, property: &str) -> bool {
        self.properties.get(element).map(|p| p.iter().any(|x| x == property)).unwrap_or(false)
    }

    fn has_event(&self, element: &str, event: &str) -> bool {
        self.events.get(element).map(|p| p.iter().any(|x| x == event)).unwrap_or(false)
    }
}
