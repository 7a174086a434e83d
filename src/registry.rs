//! Stub storage and lookup.

use crate::config::{FindRequest, Output, Stub};
use crate::error::{FindError, ValidationError};
use crate::matcher::{evaluate, normalize_method};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

/// Ordered, thread-safe collection of registered stubs.
///
/// Stubs are kept in registration order and `find` returns the first one
/// that matches, so earlier registrations win over later ones.
pub struct StubRegistry {
    stubs: RwLock<Vec<Stub>>,
}

impl StubRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stubs: RwLock::new(Vec::new()),
        }
    }

    /// Validate, normalize and append a stub.
    ///
    /// A rejected stub leaves the registry unchanged.
    pub fn add(&self, mut stub: Stub) -> Result<(), ValidationError> {
        stub.validate()?;

        let kinds = stub.input.present_kinds();
        if kinds.len() > 1 {
            warn!(
                service = %stub.service,
                method = %stub.method,
                kinds = ?kinds,
                "Stub sets several input rules, only '{}' is evaluated",
                kinds[0]
            );
        }
        if let Some(matches) = &stub.input.matches {
            for (field, pattern) in matches {
                if let Some(pattern) = pattern.as_str() {
                    if let Err(e) = regex::Regex::new(pattern) {
                        warn!(
                            service = %stub.service,
                            method = %stub.method,
                            field = %field,
                            error = %e,
                            "Stub carries an invalid pattern, finds reaching it will fail"
                        );
                    }
                }
            }
        }

        info!(service = %stub.service, method = %stub.method, "Stub added");
        self.stubs.write().push(stub);
        Ok(())
    }

    /// Snapshot of every stub in registration order.
    pub fn list(&self) -> Vec<Stub> {
        self.stubs.read().clone()
    }

    /// Find the output of the first stub matching the request.
    ///
    /// Only stubs with the same service and (normalized) method are
    /// considered. A rule that cannot be evaluated aborts the scan.
    pub fn find(&self, request: &FindRequest) -> Result<Output, FindError> {
        let method = normalize_method(&request.method);
        let stubs = self.stubs.read();

        for (idx, stub) in stubs.iter().enumerate() {
            if stub.service != request.service || stub.method != method {
                continue;
            }
            let Some((kind, rule)) = stub.input.active_rule() else {
                continue;
            };

            if evaluate(kind, rule, &request.data)? {
                debug!(
                    service = %stub.service,
                    method = %stub.method,
                    index = idx,
                    rule = %kind,
                    "Stub matched"
                );
                return Ok(stub.output.clone());
            }
        }

        Err(FindError::NotFound {
            service: request.service.clone(),
            method,
        })
    }

    /// Remove every stub.
    pub fn clear(&self) {
        let mut stubs = self.stubs.write();
        let removed = stubs.len();
        stubs.clear();
        info!(removed, "Stubs cleared");
    }

    /// Number of stored stubs.
    pub fn len(&self) -> usize {
        self.stubs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.read().is_empty()
    }
}

impl Default for StubRegistry {
    fn default() -> Self {
        Self::new()
    }
}
