//! Headless form binding.
//!
//! `Autofill` ties a ZIP input to city/state/county outputs of any form that
//! implements [`AutofillForm`]. Feed it every input change; once the value is
//! a complete five-digit code it resolves the code and fills the form, or
//! hands the result to the matching callback in [`AutofillOptions`] when one
//! is set. `unbind` detaches and hands the form back.

use std::sync::Arc;

use crate::service::ZipLookup;
use crate::types::{Location, LookupResult};
use crate::zipcode::ZIP_LEN;

/// Output side of a bound form
pub trait AutofillForm {
    fn set_city(&mut self, city: &str);
    fn set_state(&mut self, state: &str);
    fn set_county(&mut self, county: &str);

    /// Offer a choice between locations; forms without a selection control ignore it.
    fn set_choices(&mut self, _choices: &[Location]) {}

    fn clear(&mut self) {
        self.set_city("");
        self.set_state("");
        self.set_county("");
        self.set_choices(&[]);
    }

    fn fill(&mut self, location: &Location) {
        self.set_city(&location.city);
        self.set_state(&location.state);
        self.set_county(&location.county);
    }
}

type ResultCallback = Box<dyn FnMut(&LookupResult) + Send>;
type NotFoundCallback = Box<dyn FnMut(&str) + Send>;

/// Callbacks replacing the default fill behavior
#[derive(Default)]
pub struct AutofillOptions {
    /// Called instead of filling the form for a single-location match
    pub on_lookup: Option<ResultCallback>,
    /// Called instead of offering choices for a multi-location match
    pub on_multiple: Option<ResultCallback>,
    /// Called with the entered code instead of clearing the form
    pub on_not_found: Option<NotFoundCallback>,
    /// Clear outputs when a complete code has no match
    pub clear_on_not_found: bool,
}

/// What a single input change resulted in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutofillEvent {
    /// Not yet a complete code; nothing happened
    Incomplete,
    Filled(LookupResult),
    Multiple(LookupResult),
    NotFound(String),
    /// The lookup table is not loaded yet
    NotReady,
}

pub struct Autofill<F: AutofillForm> {
    service: Arc<ZipLookup>,
    form: F,
    options: AutofillOptions,
    current: Option<LookupResult>,
}

impl<F: AutofillForm> Autofill<F> {
    pub fn bind(service: Arc<ZipLookup>, form: F, options: AutofillOptions) -> Self {
        Self {
            service,
            form,
            options,
            current: None,
        }
    }

    /// Handle a change of the ZIP input value
    pub fn input(&mut self, value: &str) -> AutofillEvent {
        let value = value.trim();
        if value.len() != ZIP_LEN || !value.chars().all(|c| c.is_ascii_digit()) {
            return AutofillEvent::Incomplete;
        }
        if !self.service.is_loaded() {
            return AutofillEvent::NotReady;
        }

        match self.service.lookup(value) {
            Some(result) if result.has_multiple => {
                match self.options.on_multiple.as_mut() {
                    Some(callback) => callback(&result),
                    None => {
                        self.form.set_choices(&result.locations);
                        self.form.fill(&result.locations[0]);
                    }
                }
                self.current = Some(result.clone());
                AutofillEvent::Multiple(result)
            }
            Some(result) => {
                match self.options.on_lookup.as_mut() {
                    Some(callback) => callback(&result),
                    None => {
                        self.form.set_choices(&[]);
                        self.form.fill(&result.locations[0]);
                    }
                }
                self.current = Some(result.clone());
                AutofillEvent::Filled(result)
            }
            None => {
                self.current = None;
                match self.options.on_not_found.as_mut() {
                    Some(callback) => callback(value),
                    None if self.options.clear_on_not_found => self.form.clear(),
                    None => {}
                }
                AutofillEvent::NotFound(value.to_string())
            }
        }
    }

    /// Pick one of the offered locations after a multi-location match
    pub fn select(&mut self, index: usize) -> Option<&Location> {
        let location = self.current.as_ref()?.locations.get(index)?;
        self.form.fill(location);
        Some(location)
    }

    pub fn form(&self) -> &F {
        &self.form
    }

    /// Detach from the form and return it
    pub fn unbind(self) -> F {
        self.form
    }
}
