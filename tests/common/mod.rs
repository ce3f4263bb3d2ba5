//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use now_dev::build::assets::{Asset, FunctionAsset};
use now_dev::builders::{BuildInput, BuildOutput, Builder, BuilderCache, BuilderError, BuilderLoader, PackageInstaller};
use now_dev::config::DevConfig;
use now_dev::runtime::{Function, FunctionRuntime, InvokeRequest, InvokeResponse, RuntimeError};
use now_dev::{DevServer, Shutdown, StatusManager};

/// Start a mock backend that answers with the request target it saw.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 4096];
                        let n = socket.read(&mut buf).await.unwrap_or(0);
                        let head = String::from_utf8_lossy(&buf[..n]);
                        let target = head
                            .lines()
                            .next()
                            .and_then(|line| line.split_whitespace().nth(1))
                            .unwrap_or("")
                            .to_string();
                        let body = format!("upstream saw {target}");
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nX-Upstream: mock\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// A project directory on disk.
pub struct Project {
    pub dir: tempfile::TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, content: &str) -> &Self {
        let path = self.dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
        self
    }

    pub fn now_json(&self, value: serde_json::Value) -> &Self {
        self.write("now.json", &value.to_string())
    }
}

/// Counters shared by the fakes.
#[derive(Default)]
pub struct Counters {
    pub installs: AtomicUsize,
    pub builds: AtomicUsize,
    pub invocations: AtomicUsize,
}

impl Counters {
    pub fn installs(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

/// Installs by creating the package directory.
pub struct FakeInstaller {
    counters: Arc<Counters>,
}

#[async_trait]
impl PackageInstaller for FakeInstaller {
    async fn install(&self, cwd: &Path, name: &str) -> Result<(), BuilderError> {
        self.counters.installs.fetch_add(1, Ordering::SeqCst);
        std::fs::create_dir_all(cwd.join("node_modules").join(name)).map_err(|e| BuilderError::Install {
            name: name.into(),
            reason: e.to_string(),
        })
    }
}

/// Packages every entrypoint as a function whose handler is the entrypoint.
///
/// Fails when the entrypoint's source contains `throw`.
pub struct FakeBuilder {
    name: String,
    delay: Duration,
    counters: Arc<Counters>,
}

#[async_trait]
impl Builder for FakeBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn build(&self, input: BuildInput<'_>) -> Result<BuildOutput, BuilderError> {
        self.counters.builds.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let source = std::fs::read_to_string(&input.files[input.entrypoint].fs_path).unwrap_or_default();
        if source.contains("throw") {
            return Err(BuilderError::Failed {
                message: format!("SyntaxError in {}", input.entrypoint),
                stack: Some("at build (index.js:1:1)".into()),
            });
        }

        let mut environment = BTreeMap::new();
        environment.insert("SOURCE".to_string(), source);
        let mut output = BuildOutput::default();
        output.outputs.insert(
            input.entrypoint.to_string(),
            Asset::Function(FunctionAsset {
                code: b"PK\x03\x04".to_vec(),
                handler: input.entrypoint.to_string(),
                runtime: "nodejs8.10".into(),
                environment,
            }),
        );
        Ok(output)
    }
}

pub struct FakeLoader {
    delay: Duration,
    counters: Arc<Counters>,
}

impl BuilderLoader for FakeLoader {
    fn load(&self, name: &str, _package_dir: &Path) -> Result<Arc<dyn Builder>, BuilderError> {
        Ok(Arc::new(FakeBuilder {
            name: name.to_string(),
            delay: self.delay,
            counters: self.counters.clone(),
        }))
    }
}

/// Replies with a JSON description of the invocation.
pub struct EchoRuntime {
    counters: Arc<Counters>,
}

struct EchoFunction {
    asset: FunctionAsset,
    counters: Arc<Counters>,
}

#[async_trait]
impl FunctionRuntime for EchoRuntime {
    async fn create(&self, asset: &FunctionAsset) -> Result<Box<dyn Function>, RuntimeError> {
        Ok(Box::new(EchoFunction {
            asset: asset.clone(),
            counters: self.counters.clone(),
        }))
    }
}

#[async_trait]
impl Function for EchoFunction {
    async fn invoke(&self, request: InvokeRequest) -> Result<InvokeResponse, RuntimeError> {
        self.counters.invocations.fetch_add(1, Ordering::SeqCst);
        let body = STANDARD
            .decode(&request.body)
            .map_err(|e| RuntimeError::Response(e.to_string()))?;
        let reply = serde_json::json!({
            "handler": self.asset.handler,
            "source": self.asset.environment.get("SOURCE"),
            "method": request.method,
            "path": request.path,
            "encoding": request.encoding,
            "body": String::from_utf8_lossy(&body),
        });

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Ok(InvokeResponse {
            status_code: 200,
            headers,
            body: STANDARD.encode(reply.to_string()),
            encoding: Some("base64".into()),
        })
    }
}

/// A dev server listening on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub status: StatusManager,
    pub counters: Arc<Counters>,
    pub shutdown: Shutdown,
    pub deployer: now_dev::build::Deployer,
    _cache: tempfile::TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_server(project: &Project) -> TestServer {
    start_server_with(project, Duration::ZERO).await
}

/// Start a server whose builders take `build_delay` per entrypoint.
pub async fn start_server_with(project: &Project, build_delay: Duration) -> TestServer {
    let cache_dir = tempfile::tempdir().unwrap();
    let counters = Arc::new(Counters::default());

    let cache = BuilderCache::new(
        cache_dir.path().to_path_buf(),
        Arc::new(FakeInstaller {
            counters: counters.clone(),
        }),
        Arc::new(FakeLoader {
            delay: build_delay,
            counters: counters.clone(),
        }),
    );
    let runtime = EchoRuntime {
        counters: counters.clone(),
    };
    let server = DevServer::with_components(project.path(), DevConfig::default(), Arc::new(cache), Arc::new(runtime));

    let status = server.status().clone();
    let deployer = server.deployer().clone();
    let shutdown = Shutdown::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    tokio::time::timeout(Duration::from_secs(5), status.wait_until_not_busy())
        .await
        .unwrap();

    TestServer {
        addr,
        status,
        counters,
        shutdown,
        deployer,
        _cache: cache_dir,
    }
}

/// A client that neither follows redirects nor uses a system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}
