//! Named client configuration store
//!
//! Every logical client name maps to an ordered list of [`Contribution`]s.
//! Registrations for the same name never overwrite each other: they append, and
//! the factory later replays them in registration order against each freshly
//! constructed client or handler builder.
//!
//! The store has two phases. [`ClientOptionsRegistry`] is the mutable startup
//! form owned by the service collection; [`ClientOptionsRegistry::freeze`] turns
//! it into [`ClientOptions`], an immutable snapshot that can be shared across
//! threads without locking.

use std::any::TypeId;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::HttpClient;
use crate::error::{ClientError, ClientResult};
use crate::handler::HandlerBuilder;

/// Callback applied to every client constructed for a name
pub type ClientMutator = Arc<dyn Fn(&mut HttpClient) + Send + Sync>;

/// Callback applied to the handler builder before the chain is assembled
pub type HandlerBuilderMutator = Arc<dyn Fn(&mut HandlerBuilder) + Send + Sync>;

/// Logical name of an HTTP client configuration
///
/// Explicit names must contain at least one non-whitespace character. The empty
/// string is reserved for [`ClientName::DEFAULT`], the unnamed client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ClientName(String);

impl ClientName {
    /// Sentinel name of the unnamed client
    pub const DEFAULT: ClientName = ClientName(String::new());

    /// Validate and wrap an explicit client name
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidArgument`] for blank names.
    pub fn new(name: impl Into<String>) -> ClientResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ClientError::invalid_argument(
                "name",
                "client name must not be blank",
            ));
        }
        Ok(Self(name))
    }

    /// Wrap a name handed to a factory at construction time
    ///
    /// Factories accept any name, including unregistered ones, so no validation
    /// is applied here.
    pub(crate) fn from_lookup(name: &str) -> Self {
        Self(name.to_owned())
    }

    /// The name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the unnamed client
    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }
}

impl Borrow<str> for ClientName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ClientName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            f.write_str("<default>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Records that a typed client type constructs itself from a named client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedBinding {
    type_id: TypeId,
    type_name: &'static str,
}

impl TypedBinding {
    /// Binding for type `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Fully-qualified name of the bound type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether this binding is for type `T`
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

/// One configuration step registered for a client name
#[derive(Clone)]
pub enum Contribution {
    /// Mutates each freshly constructed [`HttpClient`]
    ClientMutator(ClientMutator),
    /// Mutates the [`HandlerBuilder`] before the handler chain is built
    HandlerBuilderMutator(HandlerBuilderMutator),
    /// Marks the name as the source client of a typed client
    TypedClientBinding(TypedBinding),
}

impl Contribution {
    /// Wrap a client mutation callback
    pub fn client<F>(mutator: F) -> Self
    where
        F: Fn(&mut HttpClient) + Send + Sync + 'static,
    {
        Self::ClientMutator(Arc::new(mutator))
    }

    /// Wrap a handler builder mutation callback
    pub fn handler_builder<F>(mutator: F) -> Self
    where
        F: Fn(&mut HandlerBuilder) + Send + Sync + 'static,
    {
        Self::HandlerBuilderMutator(Arc::new(mutator))
    }

    fn kind(&self) -> &'static str {
        match self {
            Contribution::ClientMutator(_) => "client_mutator",
            Contribution::HandlerBuilderMutator(_) => "handler_builder_mutator",
            Contribution::TypedClientBinding(_) => "typed_client_binding",
        }
    }
}

impl fmt::Debug for Contribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Contribution::ClientMutator(_) => f.write_str("ClientMutator(..)"),
            Contribution::HandlerBuilderMutator(_) => f.write_str("HandlerBuilderMutator(..)"),
            Contribution::TypedClientBinding(binding) => f
                .debug_tuple("TypedClientBinding")
                .field(&binding.type_name)
                .finish(),
        }
    }
}

/// Startup-phase store of contributions keyed by client name
#[derive(Debug, Default, Clone)]
pub struct ClientOptionsRegistry {
    entries: HashMap<ClientName, Vec<Contribution>>,
}

impl ClientOptionsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `contribution` to the list for `name`
    pub fn register(&mut self, name: &ClientName, contribution: Contribution) {
        let contributions = self.entries.entry(name.clone()).or_default();

        if let Contribution::TypedClientBinding(binding) = &contribution
            && let Some(existing) = contributions.iter().find_map(|c| match c {
                Contribution::TypedClientBinding(other) if other != binding => Some(other),
                _ => None,
            })
        {
            warn!(
                client = %name,
                existing = existing.type_name(),
                added = binding.type_name(),
                "client name is bound to more than one typed client; configuration is shared"
            );
        }

        debug!(
            client = %name,
            kind = contribution.kind(),
            position = contributions.len(),
            "registering client contribution"
        );
        contributions.push(contribution);
    }

    /// Contributions for `name` in registration order
    pub fn resolve(&self, name: &str) -> &[Contribution] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether any contribution exists for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered client names, sorted
    pub fn names(&self) -> Vec<&ClientName> {
        let mut names: Vec<&ClientName> = self.entries.keys().collect();
        names.sort();
        names
    }

    /// Number of configured names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no name has been configured
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze into an immutable snapshot
    pub fn freeze(self) -> ClientOptions {
        ClientOptions {
            entries: self
                .entries
                .into_iter()
                .map(|(name, contributions)| (name, Arc::from(contributions)))
                .collect(),
        }
    }
}

/// Frozen, read-only view of all named client configuration
#[derive(Debug, Default)]
pub struct ClientOptions {
    entries: HashMap<ClientName, Arc<[Contribution]>>,
}

impl ClientOptions {
    /// Contributions for `name` in registration order
    pub fn resolve(&self, name: &str) -> &[Contribution] {
        self.entries
            .get(name)
            .map(|contributions| &**contributions)
            .unwrap_or_default()
    }

    /// Client mutators for `name` in registration order
    pub fn client_mutators<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a ClientMutator> {
        self.resolve(name).iter().filter_map(|c| match c {
            Contribution::ClientMutator(mutator) => Some(mutator),
            _ => None,
        })
    }

    /// Handler builder mutators for `name` in registration order
    pub fn handler_builder_mutators<'a>(
        &'a self,
        name: &str,
    ) -> impl Iterator<Item = &'a HandlerBuilderMutator> {
        self.resolve(name).iter().filter_map(|c| match c {
            Contribution::HandlerBuilderMutator(mutator) => Some(mutator),
            _ => None,
        })
    }

    /// Typed clients bound to `name`
    pub fn typed_bindings<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a TypedBinding> {
        self.resolve(name).iter().filter_map(|c| match c {
            Contribution::TypedClientBinding(binding) => Some(binding),
            _ => None,
        })
    }

    /// Whether any contribution exists for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Configured client names, sorted
    pub fn names(&self) -> Vec<&ClientName> {
        let mut names: Vec<&ClientName> = self.entries.keys().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct GitHubClient;
    struct GitLabClient;

    fn name(value: &str) -> ClientName {
        ClientName::new(value).unwrap()
    }

    #[test]
    fn test_blank_names_rejected() {
        for blank in ["", "   ", "\t\n"] {
            let err = ClientName::new(blank).unwrap_err();
            assert_eq!(err.parameter(), Some("name"));
        }
    }

    #[test]
    fn test_default_name_is_reserved_sentinel() {
        assert!(ClientName::DEFAULT.is_default());
        assert_eq!(ClientName::DEFAULT, ClientName::default());
        assert_eq!(ClientName::DEFAULT.to_string(), "<default>");
        assert!(!name("github").is_default());
    }

    #[test]
    fn test_register_appends_in_order() {
        let mut registry = ClientOptionsRegistry::new();
        let github = name("github");

        registry.register(&github, Contribution::client(|_| {}));
        registry.register(&github, Contribution::handler_builder(|_| {}));
        registry.register(&github, Contribution::client(|_| {}));

        let kinds: Vec<&str> = registry.resolve("github").iter().map(Contribution::kind).collect();
        assert_eq!(
            kinds,
            vec!["client_mutator", "handler_builder_mutator", "client_mutator"]
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_names_are_independent() {
        let mut registry = ClientOptionsRegistry::new();
        registry.register(&name("a"), Contribution::client(|_| {}));
        registry.register(&name("b"), Contribution::client(|_| {}));
        registry.register(&name("b"), Contribution::client(|_| {}));

        assert_eq!(registry.resolve("a").len(), 1);
        assert_eq!(registry.resolve("b").len(), 2);
        assert!(registry.resolve("c").is_empty());
        assert_eq!(
            registry.names().iter().map(|n| n.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_freeze_preserves_contributions() {
        let mut registry = ClientOptionsRegistry::new();
        let github = name("github");
        registry.register(&github, Contribution::client(|_| {}));
        registry.register(&github, Contribution::TypedClientBinding(TypedBinding::of::<GitHubClient>()));
        registry.register(&github, Contribution::handler_builder(|_| {}));

        let options = registry.freeze();
        assert_eq!(options.resolve("github").len(), 3);
        assert_eq!(options.client_mutators("github").count(), 1);
        assert_eq!(options.handler_builder_mutators("github").count(), 1);

        let bindings: Vec<_> = options.typed_bindings("github").collect();
        assert_eq!(bindings.len(), 1);
        assert!(bindings[0].is::<GitHubClient>());
        assert!(!bindings[0].is::<GitLabClient>());
    }

    #[test]
    fn test_second_typed_binding_still_merges() {
        let mut registry = ClientOptionsRegistry::new();
        let shared = name("shared");
        registry.register(&shared, Contribution::TypedClientBinding(TypedBinding::of::<GitHubClient>()));
        registry.register(&shared, Contribution::TypedClientBinding(TypedBinding::of::<GitLabClient>()));

        let options = registry.freeze();
        assert_eq!(options.typed_bindings("shared").count(), 2);
    }
}
