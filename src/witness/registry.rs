//! Witness handler registry.
//!
//! Maps each [`WitnessKind`] to the single handler that applies it. Games
//! register their handlers once at startup and hand the registry to the
//! dispatcher.

use rustc_hash::FxHashMap;

use super::handler::WitnessHandler;
use super::record::{WitnessError, WitnessKind};

/// Errors from configuring the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A handler for this kind is already registered.
    #[error("a handler for witness `{kind}` is already registered")]
    DuplicateHandler {
        /// Kind registered twice.
        kind: WitnessKind,
    },
}

/// Registry of witness handlers, one per kind.
///
/// ## Example
///
/// ```
/// use card_sync::witness::{FnHandler, Handled, WitnessHandlerRegistry, WitnessKind};
///
/// let mut registry: WitnessHandlerRegistry<Vec<i64>> = WitnessHandlerRegistry::new();
/// registry
///     .register(FnHandler::new(WitnessKind::TurnStart, |w, turns: &mut Vec<i64>, _| {
///         turns.push(w.int("playerIndex", -1));
///         Ok(Handled::Consumed)
///     }))
///     .unwrap();
///
/// assert!(registry.contains(WitnessKind::TurnStart));
/// assert!(registry.resolve(WitnessKind::OnUse).is_err());
/// ```
pub struct WitnessHandlerRegistry<S> {
    handlers: FxHashMap<WitnessKind, Box<dyn WitnessHandler<S>>>,
}

impl<S> Default for WitnessHandlerRegistry<S> {
    fn default() -> Self {
        Self {
            handlers: FxHashMap::default(),
        }
    }
}

impl<S> WitnessHandlerRegistry<S> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own kind.
    ///
    /// Registering a second handler for a kind fails and leaves the first
    /// one in place.
    pub fn register<H>(&mut self, handler: H) -> Result<(), RegistryError>
    where
        H: WitnessHandler<S> + 'static,
    {
        let kind = handler.kind();
        if self.handlers.contains_key(&kind) {
            return Err(RegistryError::DuplicateHandler { kind });
        }
        self.handlers.insert(kind, Box::new(handler));
        Ok(())
    }

    /// Register a handler (builder pattern).
    pub fn with<H>(mut self, handler: H) -> Result<Self, RegistryError>
    where
        H: WitnessHandler<S> + 'static,
    {
        self.register(handler)?;
        Ok(self)
    }

    /// Find the handler for `kind`.
    pub fn resolve(&mut self, kind: WitnessKind) -> Result<&mut (dyn WitnessHandler<S> + 'static), WitnessError> {
        self.handlers
            .get_mut(&kind)
            .map(|handler| &mut **handler)
            .ok_or_else(|| WitnessError::UnknownWitness {
                name: kind.wire_name().to_string(),
            })
    }

    /// Check whether `kind` has a handler.
    #[must_use]
    pub fn contains(&self, kind: WitnessKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered kinds, in declaration order.
    pub fn kinds(&self) -> impl Iterator<Item = WitnessKind> + '_ {
        WitnessKind::ALL.into_iter().filter(move |kind| self.contains(*kind))
    }
}

impl<S> std::fmt::Debug for WitnessHandlerRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WitnessHandlerRegistry")
            .field("kinds", &self.kinds().collect::<Vec<_>>())
            .finish()
    }
}
