//! Local byte-stream transport for the control channel
//!
//! Unix domain sockets on Unix, named pipes on Windows. Both sides only see
//! `AsyncRead + AsyncWrite` streams, so the line protocol is identical.

use std::io;
use std::path::Path;
use std::time::Duration;

#[cfg(unix)]
mod imp {
    use super::*;
    use std::path::PathBuf;
    use tokio::net::{UnixListener, UnixStream};

    /// Server-side connection
    pub type ServerStream = UnixStream;
    /// Client-side connection
    pub type ClientStream = UnixStream;

    /// Listener on the control socket. The socket file is removed on drop.
    pub struct LocalListener {
        inner: UnixListener,
        path: PathBuf,
    }

    impl LocalListener {
        /// Bind the control socket, replacing a stale socket file.
        ///
        /// Fails with `AddrInUse` when another daemon still answers on it.
        pub fn bind(endpoint: &Path) -> io::Result<Self> {
            if let Some(parent) = endpoint.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let inner = match UnixListener::bind(endpoint) {
                Ok(listener) => listener,
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                    if std::os::unix::net::UnixStream::connect(endpoint).is_ok() {
                        return Err(io::Error::new(
                            io::ErrorKind::AddrInUse,
                            format!("daemon already running at {}", endpoint.display()),
                        ));
                    }
                    std::fs::remove_file(endpoint)?;
                    UnixListener::bind(endpoint)?
                }
                Err(e) => return Err(e),
            };

            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(endpoint, std::fs::Permissions::from_mode(0o600))?;
            }

            Ok(Self {
                inner,
                path: endpoint.to_path_buf(),
            })
        }

        pub async fn accept(&mut self) -> io::Result<ServerStream> {
            let (stream, _) = self.inner.accept().await?;
            Ok(stream)
        }
    }

    impl Drop for LocalListener {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    pub(super) async fn connect(endpoint: &Path) -> io::Result<ClientStream> {
        UnixStream::connect(endpoint).await
    }
}

#[cfg(windows)]
mod imp {
    use super::*;
    use std::ffi::OsString;
    use tokio::net::windows::named_pipe::{
        ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
    };

    const ERROR_PIPE_BUSY: i32 = 231;

    /// Server-side connection
    pub type ServerStream = NamedPipeServer;
    /// Client-side connection
    pub type ClientStream = NamedPipeClient;

    /// Listener on the control pipe. One idle instance always waits for
    /// the next client.
    pub struct LocalListener {
        name: OsString,
        next: NamedPipeServer,
    }

    impl LocalListener {
        pub fn bind(endpoint: &Path) -> io::Result<Self> {
            let name = endpoint.as_os_str().to_os_string();
            let next = ServerOptions::new()
                .first_pipe_instance(true)
                .create(&name)?;
            Ok(Self { name, next })
        }

        pub async fn accept(&mut self) -> io::Result<ServerStream> {
            self.next.connect().await?;
            let fresh = ServerOptions::new().create(&self.name)?;
            Ok(std::mem::replace(&mut self.next, fresh))
        }
    }

    pub(super) async fn connect(endpoint: &Path) -> io::Result<ClientStream> {
        loop {
            match ClientOptions::new().open(endpoint.as_os_str()) {
                Ok(client) => return Ok(client),
                Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) => {}
                Err(e) => return Err(e),
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

pub use imp::{ClientStream, LocalListener, ServerStream};

/// Connect to the control endpoint, giving up after `timeout`
pub async fn dial(endpoint: &Path, timeout: Duration) -> io::Result<ClientStream> {
    match tokio::time::timeout(timeout, imp::connect(endpoint)).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("timed out connecting to {}", endpoint.display()),
        )),
    }
}
