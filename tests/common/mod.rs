//! Shared harness for integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use moonhost::functions::{
    ExecutionStore, FileExecutionStore, Function, Invoker, LuaRuntime, MemoryExecutionStore,
    RuntimeConfig,
};
use moonhost::kv::{MemoryStore, NamespacedStore};
use moonhost::outbound::{HttpClient, HttpError, HttpRequest, HttpResponse, HttpResult};

/// Records every request; answers with a canned response or a transport error
#[derive(Default)]
pub struct FakeHttp {
    requests: Mutex<Vec<HttpRequest>>,
    response: Option<HttpResponse>,
}

impl FakeHttp {
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn responding(status: u16, body: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            response: Some(HttpResponse {
                status,
                headers: BTreeMap::new(),
                body: body.to_string(),
            }),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn send(&self, request: HttpRequest) -> HttpResult<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        self.response
            .clone()
            .ok_or_else(|| HttpError::Transport("network disabled in tests".into()))
    }
}

pub struct Host {
    pub invoker: Invoker,
    pub store: Arc<dyn ExecutionStore>,
    pub kv: Arc<dyn NamespacedStore>,
    pub env: Arc<dyn NamespacedStore>,
    pub http: Arc<FakeHttp>,
}

impl Host {
    pub fn in_memory(http: FakeHttp, timeout: Duration) -> Self {
        Self::with_store(Arc::new(MemoryExecutionStore::new()), http, timeout)
    }

    pub fn on_disk(path: &Path, timeout: Duration) -> Self {
        Self::with_store(
            Arc::new(FileExecutionStore::new(path)),
            FakeHttp::offline(),
            timeout,
        )
    }

    pub fn with_store(store: Arc<dyn ExecutionStore>, http: FakeHttp, timeout: Duration) -> Self {
        let kv: Arc<dyn NamespacedStore> = Arc::new(MemoryStore::new());
        let env: Arc<dyn NamespacedStore> = Arc::new(MemoryStore::new());
        let http = Arc::new(http);

        let runtime = LuaRuntime::new(Arc::clone(&kv), Arc::clone(&env), http.clone());
        let invoker = Invoker::new(
            Arc::clone(&store),
            Arc::new(runtime),
            RuntimeConfig {
                timeout,
                ..RuntimeConfig::default()
            },
        );

        Self {
            invoker,
            store,
            kv,
            env,
            http,
        }
    }

    /// Register a function and deploy `code` as its first version
    pub fn deploy(&self, name: &str, code: &str) -> Function {
        let function = self.store.create_function(Function::new(name)).unwrap();
        self.store.create_version(&function.id, code, None).unwrap();
        function
    }
}
