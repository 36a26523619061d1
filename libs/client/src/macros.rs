//! Macros for declaring typed resources.

/// Declare a resource struct with `metadata`, `spec` and optional `status`.
///
/// This generates:
/// - The struct, deriving `Debug`, `Clone`, `Default`, `Serialize`, `Deserialize`
/// - `new(name, spec)` for cluster-scoped objects and `namespaced(ns, name, spec)`
/// - A [`Resource`](crate::Resource) implementation whose kind is the struct name
///
/// The calling crate must depend on `serde`.
///
/// # Example
///
/// ```ignore
/// define_resource!(Widget {
///     group: "example.sortie.dev",
///     version: "v1",
///     plural: "widgets",
///     scope: Namespaced,
///     spec: WidgetSpec,
///     status: WidgetStatus,
/// });
/// ```
#[macro_export]
macro_rules! define_resource {
    (
        $(#[$attr:meta])*
        $name:ident {
            group: $group:literal,
            version: $version:literal,
            plural: $plural:literal,
            scope: $scope:ident,
            spec: $spec:ty,
            status: $status:ty $(,)?
        }
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Default, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $name {
            #[serde(default)]
            pub metadata: $crate::ObjectMeta,

            #[serde(default)]
            pub spec: $spec,

            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub status: Option<$status>,
        }

        impl $name {
            /// Creates an object with the given name and spec.
            pub fn new(name: impl Into<String>, spec: $spec) -> Self {
                Self {
                    metadata: $crate::ObjectMeta::named(name),
                    spec,
                    status: None,
                }
            }

            /// Creates an object in `namespace`.
            pub fn namespaced(
                namespace: impl Into<String>,
                name: impl Into<String>,
                spec: $spec,
            ) -> Self {
                Self {
                    metadata: $crate::ObjectMeta::named(name).in_namespace(namespace),
                    spec,
                    status: None,
                }
            }
        }

        impl $crate::Resource for $name {
            const GROUP: &'static str = $group;
            const VERSION: &'static str = $version;
            const KIND: &'static str = stringify!($name);
            const PLURAL: &'static str = $plural;
            const SCOPE: $crate::Scope = $crate::Scope::$scope;

            fn meta(&self) -> &$crate::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut $crate::ObjectMeta {
                &mut self.metadata
            }
        }
    };
}
