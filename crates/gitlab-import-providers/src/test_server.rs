//! Local axum server for exercising the blocking clients end to end.

use axum::Router;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

pub(crate) struct TestServer {
    // Dropping the runtime stops the server.
    _runtime: Runtime,
    base_url: String,
}

impl TestServer {
    pub(crate) fn start(app: Router) -> Self {
        let runtime = Runtime::new().expect("test runtime");
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        runtime.spawn(async move {
            axum::serve(listener, app).await.expect("serve test app");
        });
        Self {
            _runtime: runtime,
            base_url: format!("http://{addr}"),
        }
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}
