//! TCP host

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;

use tracing::Span;

use crate::config::NetConfig;
use crate::error::{Result, TandemError};
use crate::protocol::GroupTable;
use crate::threading::{ThreadRun, ThreadRunner};

use super::{Host, HostShared, HostState};
use crate::network::TcpConnection;

/// Accepts TCP sockets and publishes them as `TcpConnection`s
///
/// ## Usage
/// ```no_run
/// # fn demo(inbound: std::sync::Arc<tandem::protocol::GroupTable>,
/// #         outbound: std::sync::Arc<tandem::protocol::GroupTable>) -> tandem::Result<()> {
/// use tandem::network::{Host, NetConnection, TcpHost};
///
/// let host = TcpHost::bind("127.0.0.1:0", inbound, outbound, tandem::NetConfig::default(), &tracing::Span::none())?;
/// host.start()?;
/// if let Some(connection) = host.poll_new_connection() {
///     while let Some(packet) = connection.poll_receive_packet() {
///         connection.send(packet);
///     }
/// }
/// host.close();
/// # Ok(())
/// # }
/// ```
pub struct TcpHost {
    run: ThreadRun<TcpHostRunner>,
    shared: Arc<HostShared<TcpConnection>>,
    local_addr: SocketAddr,
}

struct TcpHostRunner {
    listener: Option<TcpListener>,
    shared: Arc<HostShared<TcpConnection>>,
    inbound: Arc<GroupTable>,
    outbound: Arc<GroupTable>,
    config: NetConfig,
    span: Span,
}

impl TcpHost {
    /// Bind the listener; accepting begins at `start`
    pub fn bind(
        addr: impl ToSocketAddrs,
        inbound: Arc<GroupTable>,
        outbound: Arc<GroupTable>,
        config: NetConfig,
        parent: &Span,
    ) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        let span = tracing::info_span!(parent: parent, "tcp_host", addr = %local_addr);
        let shared = HostShared::new();
        let tick_interval = config.host_tick_interval;

        let runner = TcpHostRunner {
            listener: Some(listener),
            shared: Arc::clone(&shared),
            inbound,
            outbound,
            config,
            span: span.clone(),
        };

        let run = ThreadRun::with_parent("TcpHost", runner, &span)?;
        run.register_tick_call(tick_interval, TcpHostRunner::tick)?;

        Ok(Self {
            run,
            shared,
            local_addr,
        })
    }

    pub fn span(&self) -> &Span {
        self.run.span()
    }
}

impl Host for TcpHost {
    type Connection = TcpConnection;

    fn start(&self) -> Result<()> {
        if self.run.has_started() {
            return Err(TandemError::Scheduler(
                "TcpHost can only be started once".to_string(),
            ));
        }
        self.shared.set_state(HostState::Starting);
        if let Err(e) = self.run.start() {
            self.shared.set_state(HostState::Stopped);
            return Err(e);
        }
        Ok(())
    }

    fn close(&self) {
        if self.shared.state() != HostState::Stopped {
            self.shared.set_state(HostState::Stopping);
        }
        self.run.stop(true);
        self.shared.set_state(HostState::Stopped);
    }

    fn poll_new_connection(&self) -> Option<Arc<TcpConnection>> {
        self.shared.poll_new()
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn state(&self) -> HostState {
        self.shared.state()
    }

    fn active_connection_count(&self) -> usize {
        self.shared.active_count()
    }
}

impl Drop for TcpHost {
    fn drop(&mut self) {
        self.close();
    }
}

impl TcpHostRunner {
    fn tick(&mut self) -> Result<()> {
        self.accept_pending();
        let removed = self.shared.prune();
        if removed > 0 {
            tracing::debug!("pruned {} connections", removed);
        }
        Ok(())
    }

    fn accept_pending(&mut self) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };

        loop {
            match listener.accept() {
                Ok((stream, addr)) => match self.admit(stream) {
                    Ok(connection) => {
                        tracing::info!("new connection from {}", addr);
                        self.shared.publish(Arc::new(connection));
                    }
                    Err(e) => tracing::warn!("failed to admit {}: {}", addr, e),
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    break;
                }
            }
        }
    }

    fn admit(&self, stream: TcpStream) -> Result<TcpConnection> {
        // Accepted sockets may inherit the listener's non-blocking mode.
        stream.set_nonblocking(false)?;
        TcpConnection::new(
            stream,
            Arc::clone(&self.inbound),
            Arc::clone(&self.outbound),
            &self.config,
            &self.span,
        )
    }
}

impl ThreadRunner for TcpHostRunner {
    fn on_begin(&mut self) -> Result<()> {
        if let Some(listener) = self.listener.as_ref() {
            listener.set_nonblocking(true)?;
        }
        self.shared.set_state(HostState::Listening);
        tracing::info!("listening");
        Ok(())
    }

    fn on_finish(&mut self, unhandled: Option<&TandemError>) {
        self.listener = None;
        self.shared.close_all();
        self.shared.set_state(HostState::Stopped);

        match unhandled {
            Some(e) => tracing::error!("stopped: {}", e),
            None => tracing::info!("stopped"),
        }
    }
}
