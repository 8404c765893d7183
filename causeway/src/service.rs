//! Service and method registration.
//!
//! A [`Service`] is a named collection of unary methods under a dotted
//! package. Methods are registered on the builder and become immutable once
//! the service is built; the gateway synthesizes descriptors and codecs
//! from the recorded metadata afterwards.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::code::Code;
use crate::config::{Edition, Features, Syntax};
use crate::context::Context;
use crate::error::{BuildError, RpcError};
use crate::record::{Record, RecordType};
use crate::value::Value;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A handler erased over the dynamic value form.
pub type ValueHandler =
    Arc<dyn Fn(Context, Value) -> BoxFuture<Result<Value, RpcError>> + Send + Sync>;

/// The enumerated service options.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Dotted package, e.g. `user.v1`.
    pub package: String,
    /// Run the validation engine between decode and invoke.
    pub validation: bool,
    /// Serve gRPC server reflection for this service's descriptors.
    pub reflection: bool,
    pub syntax: Syntax,
    pub edition: Edition,
    pub features: Features,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            package: String::new(),
            validation: false,
            reflection: false,
            syntax: Syntax::Proto3,
            edition: Edition::Edition2023,
            features: Features::default(),
        }
    }
}

/// One registered unary method.
#[derive(Clone)]
pub struct Method {
    name: String,
    input: RecordType,
    output: RecordType,
    handler: ValueHandler,
}

impl Method {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> &RecordType {
        &self.input
    }

    pub fn output(&self) -> &RecordType {
        &self.output
    }

    pub fn handler(&self) -> ValueHandler {
        self.handler.clone()
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("input", &self.input.name)
            .field("output", &self.output.name)
            .finish()
    }
}

/// An immutable, registered service.
#[derive(Clone, Debug)]
pub struct Service {
    name: String,
    config: ServiceConfig,
    methods: Arc<Vec<Method>>,
}

impl Service {
    pub fn builder(package: impl Into<String>, name: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder {
            name: name.into(),
            config: ServiceConfig {
                package: package.into(),
                ..ServiceConfig::default()
            },
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package(&self) -> &str {
        &self.config.package
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// The URL path prefix shared by this service's methods:
    /// `/{package}.{service}`.
    pub fn path_prefix(&self) -> String {
        format!("/{}.{}", self.config.package, self.name)
    }

    /// The fully qualified method path `/{package}.{service}/{method}`.
    pub fn method_path(&self, method: &str) -> String {
        format!("{}/{}", self.path_prefix(), method)
    }
}

/// Accumulates methods and options before the service becomes immutable.
pub struct ServiceBuilder {
    name: String,
    config: ServiceConfig,
    methods: Vec<Method>,
}

impl ServiceBuilder {
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.config.validation = enabled;
        self
    }

    pub fn with_reflection(mut self, enabled: bool) -> Self {
        self.config.reflection = enabled;
        self
    }

    pub fn with_syntax(mut self, syntax: Syntax) -> Self {
        self.config.syntax = syntax;
        self
    }

    pub fn with_edition(mut self, edition: Edition) -> Self {
        self.config.edition = edition;
        self
    }

    pub fn with_features(mut self, features: Features) -> Self {
        self.config.features = features;
        self
    }

    /// Register a unary method.
    pub fn unary<In, Out, F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        In: Record,
        Out: Record,
        F: Fn(Context, In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, RpcError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: ValueHandler = Arc::new(move |ctx, value| {
            let handler = handler.clone();
            Box::pin(async move {
                let input = In::from_value(value).map_err(|e| {
                    RpcError::new(Code::Internal, format!("request record conversion: {e}"))
                })?;
                let output = handler(ctx, input).await?;
                Ok(output.to_value())
            })
        });
        self.methods.push(Method {
            name: name.into(),
            input: In::record_type(),
            output: Out::record_type(),
            handler: erased,
        });
        self
    }

    /// Seal the service. Method names must be unique and non-empty; the
    /// package must be a dotted lowercase identifier.
    pub fn build(self) -> Result<Service, BuildError> {
        if self.name.is_empty() || !self.name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(BuildError::InvalidName {
                what: "service",
                name: self.name,
            });
        }
        let package_ok = !self.config.package.is_empty()
            && self
                .config
                .package
                .split('.')
                .all(|seg| {
                    !seg.is_empty()
                        && seg.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
                        && seg.starts_with(|c: char| c.is_ascii_lowercase())
                });
        if !package_ok {
            return Err(BuildError::InvalidName {
                what: "package",
                name: self.config.package,
            });
        }
        let mut seen = std::collections::HashSet::new();
        for method in &self.methods {
            if method.name.is_empty() {
                return Err(BuildError::InvalidName {
                    what: "method",
                    name: method.name.clone(),
                });
            }
            if !seen.insert(method.name.clone()) {
                return Err(BuildError::DuplicateMethod(method.name.clone()));
            }
        }
        Ok(Service {
            name: self.name,
            config: self.config,
            methods: Arc::new(self.methods),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldKind, FieldMeta, ProtoField};

    // A hand-rolled record; the derive macro generates the same shape.
    #[derive(Clone, Debug, Default, PartialEq)]
    struct Echo {
        message: String,
    }

    impl Record for Echo {
        fn record_type() -> RecordType {
            RecordType::new::<Echo>("Echo")
                .with_field(FieldMeta::new("message", FieldKind::String))
        }

        fn to_value(&self) -> Value {
            Value::message([("message", self.message.clone().into_value())])
        }

        fn from_value(value: Value) -> Result<Self, crate::error::RecordError> {
            let mut fields = value.into_message().unwrap_or_default();
            Ok(Echo {
                message: String::from_value(fields.remove("message").unwrap_or_default())?,
            })
        }
    }

    fn echo_service() -> Service {
        Service::builder("echo.v1", "EchoService")
            .unary("Echo", |_ctx, req: Echo| async move { Ok(req) })
            .build()
            .unwrap()
    }

    #[test]
    fn paths_are_fully_qualified() {
        let svc = echo_service();
        assert_eq!(svc.path_prefix(), "/echo.v1.EchoService");
        assert_eq!(svc.method_path("Echo"), "/echo.v1.EchoService/Echo");
    }

    #[test]
    fn duplicate_methods_are_rejected() {
        let err = Service::builder("echo.v1", "EchoService")
            .unary("Echo", |_ctx, req: Echo| async move { Ok(req) })
            .unary("Echo", |_ctx, req: Echo| async move { Ok(req) })
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateMethod(name) if name == "Echo"));
    }

    #[test]
    fn invalid_package_is_rejected() {
        let err = Service::builder("Echo.V1", "EchoService")
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidName { what: "package", .. }));
    }

    #[tokio::test]
    async fn erased_handler_round_trips_values() {
        let svc = echo_service();
        let method = svc.method("Echo").unwrap();
        let reply = (method.handler())(
            Context::background(),
            Echo {
                message: "hi".into(),
            }
            .to_value(),
        )
        .await
        .unwrap();
        assert_eq!(Echo::from_value(reply).unwrap().message, "hi");
    }
}
