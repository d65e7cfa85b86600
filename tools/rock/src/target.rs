//! Method tables whose entries can be swapped at runtime.
//!
//! A [`Target`] stands in for "an object with async methods". Code under test
//! calls methods through the target by name; a session intercepts a method by
//! replacing its table entry and restores it by writing the original back.

use crate::errors::{MethodError, RockError};
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Arguments passed to a method, as JSON values.
pub type Args = Vec<Value>;

/// An in-flight method call.
pub type Call = BoxFuture<'static, Result<Value, MethodError>>;

type Invoke = dyn Fn(Args) -> Result<Call, RockError> + Send + Sync;

/// A shareable async callable.
///
/// Invoking a method has two phases: a synchronous one that may fail outright
/// (unknown method, missing replay record, undecodable arguments) and the
/// returned [`Call`] future, which settles with the method's value or its
/// [`MethodError`].
#[derive(Clone)]
pub struct Method {
    invoke: Arc<Invoke>,
}

impl Method {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, MethodError>> + Send + 'static,
    {
        Self::from_invoke(move |args| Ok(f(args).boxed()))
    }

    /// Builds a method whose argument list decodes into `A` (usually a tuple)
    /// and whose result encodes from `R`.
    pub fn typed<A, R, F, Fut>(f: F) -> Self
    where
        A: DeserializeOwned,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, MethodError>> + Send + 'static,
    {
        Self::from_invoke(move |args| {
            let decoded: A = serde_json::from_value(Value::Array(args))
                .map_err(|e| RockError::Decode(format!("arguments: {e}")))?;
            let fut = f(decoded);
            Ok(async move {
                let value = fut.await?;
                serde_json::to_value(value).map_err(|e| {
                    MethodError::new(format!("encode result: {e}")).with_code("ENCODE")
                })
            }
            .boxed())
        })
    }

    /// Lowest-level constructor; the closure decides what fails synchronously.
    pub fn from_invoke<F>(f: F) -> Self
    where
        F: Fn(Args) -> Result<Call, RockError> + Send + Sync + 'static,
    {
        Self {
            invoke: Arc::new(f),
        }
    }

    pub fn invoke(&self, args: Args) -> Result<Call, RockError> {
        (self.invoke)(args)
    }

    /// Identity comparison: true when both handles share one callable.
    pub fn ptr_eq(&self, other: &Method) -> bool {
        Arc::ptr_eq(&self.invoke, &other.invoke)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("ptr", &Arc::as_ptr(&self.invoke).cast::<()>())
            .finish()
    }
}

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

struct TargetInner {
    id: u64,
    label: String,
    methods: Mutex<HashMap<String, Method>>,
}

/// Named table of async methods. Cloning shares the table.
#[derive(Clone)]
pub struct Target {
    inner: Arc<TargetInner>,
}

impl Target {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TargetInner {
                id: NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed),
                label: label.into(),
                methods: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn with_method(self, name: impl Into<String>, method: Method) -> Self {
        self.define(name, method);
        self
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Adds or overwrites a method, returning the previous entry.
    pub fn define(&self, name: impl Into<String>, method: Method) -> Option<Method> {
        self.inner
            .methods
            .lock()
            .expect("methods lock")
            .insert(name.into(), method)
    }

    pub fn method(&self, name: &str) -> Option<Method> {
        self.inner
            .methods
            .lock()
            .expect("methods lock")
            .get(name)
            .cloned()
    }

    /// Starts a call. Errors returned here happened before any future existed.
    pub fn invoke(&self, name: &str, args: Args) -> Result<Call, RockError> {
        let method = self.method(name).ok_or_else(|| RockError::UnknownMethod {
            method: format!("{}.{name}", self.inner.label),
        })?;
        method.invoke(args)
    }

    pub async fn call(&self, name: &str, args: Args) -> Result<Value, RockError> {
        let call = self.invoke(name, args)?;
        Ok(call.await?)
    }

    pub async fn call_as<T: DeserializeOwned>(
        &self,
        name: &str,
        args: Args,
    ) -> Result<T, RockError> {
        let value = self.call(name, args).await?;
        serde_json::from_value(value).map_err(|e| RockError::Decode(format!("{name} result: {e}")))
    }

    pub fn same_as(&self, other: &Target) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> Method {
        Method::new(|args| async move { Ok(Value::Array(args)) })
    }

    #[tokio::test]
    async fn call_routes_through_table() {
        let target = Target::new("api").with_method("echo", echo());
        let value = target.call("echo", vec![json!(1), json!("x")]).await.expect("call");
        assert_eq!(value, json!([1, "x"]));
    }

    #[test]
    fn unknown_method_fails_before_any_future() {
        let target = Target::new("api");
        let err = target.invoke("missing", vec![]).err().expect("error");
        assert!(matches!(err, RockError::UnknownMethod { ref method } if method == "api.missing"));
    }

    #[test]
    fn define_returns_previous_entry() {
        let original = echo();
        let target = Target::new("api").with_method("echo", original.clone());
        let previous = target.define("echo", echo()).expect("previous");
        assert!(previous.ptr_eq(&original));
        assert!(!target.method("echo").expect("current").ptr_eq(&original));
    }

    #[tokio::test]
    async fn typed_methods_decode_tuples_and_encode_results() {
        let target = Target::new("math").with_method(
            "add",
            Method::typed(|(a, b): (i64, i64)| async move { Ok::<_, MethodError>(a + b) }),
        );
        let sum: i64 = target
            .call_as("add", vec![json!(2), json!(40)])
            .await
            .expect("add");
        assert_eq!(sum, 42);

        let err = target.invoke("add", vec![json!("nope")]).err().expect("decode error");
        assert!(matches!(err, RockError::Decode(_)));
    }

    #[tokio::test]
    async fn method_errors_surface_through_call() {
        let target = Target::new("api").with_method(
            "fail",
            Method::new(|_| async { Err(MethodError::new("boom").with_code("E42")) }),
        );
        let err = target.call("fail", vec![]).await.err().expect("error");
        match err {
            RockError::Method(method) => {
                assert_eq!(method.message, "boom");
                assert_eq!(method.code.as_deref(), Some("E42"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
