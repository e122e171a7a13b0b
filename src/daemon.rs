use crate::cli::{DaemonArgs, ForwardArgs};
use nix::libc::c_int;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, kill, sigaction};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, TcpListener};
use std::os::fd::{AsRawFd as _, FromRawFd as _, OwnedFd, RawFd};
use std::process::exit;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tiny_http::{Method, Response, Server};

static FLAG_SHUTDOWN: AtomicBool = AtomicBool::new(false);
// unix millis of the last finished sync run, 0 = never
static LAST_SUCCESS: AtomicU64 = AtomicU64::new(0);
static LAST_FAILED: AtomicU64 = AtomicU64::new(0);

const POLL: Duration = Duration::from_millis(100);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Healthy if the last run succeeded and did so within two sync intervals.
pub fn is_healthy(now: u64, last_success: u64, last_failed: u64, interval: Duration) -> bool {
    let window = 2 * interval.as_millis() as u64;
    last_success > last_failed && last_success > now.saturating_sub(window)
}

extern "C" fn handlerfunc(_signum: c_int) {
    FLAG_SHUTDOWN.store(true, Ordering::Relaxed);
}

fn install_signal_handler() -> nix::Result<()> {
    let handler = SigHandler::Handler(handlerfunc);
    let action = SigAction::new(handler, SaFlags::empty(), SigSet::empty());
    unsafe {
        sigaction(Signal::SIGTERM, &action)?;
        sigaction(Signal::SIGINT, &action)?;
    }
    Ok(())
}

fn status_socket(address: &str) -> anyhow::Result<Socket> {
    #[cfg(feature = "systemd")]
    {
        let fds = systemd::daemon::listen_fds(false)
            .map_err(|e| anyhow::anyhow!("listen_fds: {e}"))?;
        if let Some(fd) = fds.iter().next() {
            log::info!("using socket activated listener");
            return Ok(unsafe { Socket::from_raw_fd(fd) });
        }
    }
    let address: SocketAddr = address.parse()?;
    let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&address.into())?;
    socket.listen(16)?;
    log::info!("status endpoint listening on {address}");
    Ok(socket)
}

/// HTTP status for one request to the health endpoint.
pub fn status_code(method: &Method, url: &str, healthy: bool) -> u16 {
    match (method, url) {
        (Method::Get, "/status") if healthy => 200,
        (Method::Get, "/status") => 500,
        _ => 404,
    }
}

fn serve_status(server: Server, interval: Duration) {
    for request in server.incoming_requests() {
        let healthy = is_healthy(
            now_millis(),
            LAST_SUCCESS.load(Ordering::Relaxed),
            LAST_FAILED.load(Ordering::Relaxed),
            interval,
        );
        let code = status_code(request.method(), request.url(), healthy);
        if let Err(e) = request.respond(Response::empty(code)) {
            log::debug!("status request: {e}");
        }
    }
}

fn reset_signal_handlers() -> nix::Result<()> {
    let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    unsafe {
        sigaction(Signal::SIGTERM, &action)?;
        sigaction(Signal::SIGINT, &action)?;
    }
    Ok(())
}

/// Runs one forward pass in a child process, killing it after `timeout`.
fn run_forked(args: &ForwardArgs, timeout: Duration, status_fd: RawFd) -> bool {
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            // the listener belongs to the status thread, which does not
            // exist in the child
            drop(unsafe { OwnedFd::from_raw_fd(status_fd) });
            if let Err(e) = reset_signal_handlers() {
                log::error!("sigaction: {e}");
                exit(1);
            }
            match crate::cli::cmd_forward(args) {
                Ok(_) => exit(0),
                Err(e) => {
                    log::error!("forwarding error: {e:#}");
                    exit(1)
                }
            }
        }
        Ok(ForkResult::Parent { child }) => wait_child(child, timeout, &FLAG_SHUTDOWN),
        Err(e) => {
            log::error!("fork: {e}");
            false
        }
    }
}

/// Waits for `child`. Once `shutdown` is set the child gets SIGTERM; after
/// `timeout` it gets SIGKILL.
fn wait_child(child: Pid, timeout: Duration, shutdown: &AtomicBool) -> bool {
    let started = Instant::now();
    let mut terminated = false;
    loop {
        match waitpid(child, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => return code == 0,
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                log::error!("sync process killed by {signal:?}");
                return false;
            }
            Ok(_) => {}
            Err(nix::errno::Errno::EINTR) => {}
            Err(e) => {
                log::error!("waitpid: {e}");
                return false;
            }
        }
        if started.elapsed() >= timeout {
            log::warn!("Killing sync process by timeout");
            let _ = kill(child, Signal::SIGKILL);
            let _ = waitpid(child, None);
            return false;
        }
        if !terminated && shutdown.load(Ordering::Relaxed) {
            log::info!("stopping sync process");
            let _ = kill(child, Signal::SIGTERM);
            terminated = true;
        }
        thread::sleep(POLL);
    }
}

fn sleep_unless_shutdown(duration: Duration) {
    let started = Instant::now();
    while started.elapsed() < duration && !FLAG_SHUTDOWN.load(Ordering::Relaxed) {
        thread::sleep(POLL.min(duration.saturating_sub(started.elapsed())));
    }
}

pub fn daemon(args: &DaemonArgs) -> anyhow::Result<()> {
    let interval = Duration::from_millis(args.interval_ms);
    let timeout = Duration::from_millis(args.timeout_ms);

    let socket = status_socket(&args.status_address)?;
    let status_fd = socket.as_raw_fd();
    let server = Server::from_listener(TcpListener::from(socket), None)
        .map_err(|e| anyhow::anyhow!("status endpoint: {e}"))?;
    thread::spawn(move || serve_status(server, interval));

    install_signal_handler()?;
    while !FLAG_SHUTDOWN.load(Ordering::Relaxed) {
        if run_forked(&args.forward, timeout, status_fd) {
            LAST_SUCCESS.store(now_millis(), Ordering::Relaxed);
        } else {
            LAST_FAILED.store(now_millis(), Ordering::Relaxed);
        }
        sleep_unless_shutdown(interval);
    }
    log::info!("shutting down");
    Ok(())
}

#[test]
fn test_is_healthy() {
    let minute = Duration::from_secs(60);
    let now = 10_000_000;
    assert!(!is_healthy(now, 0, 0, minute));
    assert!(is_healthy(now, now - 1_000, 0, minute));
    assert!(is_healthy(now, now - 119_000, now - 200_000, minute));
    assert!(!is_healthy(now, now - 121_000, 0, minute));
    assert!(!is_healthy(now, now - 2_000, now - 1_000, minute));
}

#[test]
fn test_status_code() {
    assert_eq!(status_code(&Method::Get, "/status", true), 200);
    assert_eq!(status_code(&Method::Get, "/status", false), 500);
    assert_eq!(status_code(&Method::Get, "/", true), 404);
    assert_eq!(status_code(&Method::Post, "/status", true), 404);
}

#[test]
fn test_serve_status_over_tcp() {
    use std::io::{Read, Write};

    let socket = status_socket("127.0.0.1:0").unwrap();
    let address = socket.local_addr().unwrap().as_socket().unwrap();
    let server = Server::from_listener(TcpListener::from(socket), None).unwrap();
    thread::spawn(move || serve_status(server, Duration::from_secs(60)));

    let get = |path: &str| {
        let mut stream = std::net::TcpStream::connect(address).unwrap();
        write!(
            stream,
            "GET {path} HTTP/1.1\r\nHost: localhost\r\nUser-Agent: test\r\nAccept: */*\r\nConnection: close\r\n\r\n"
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    };
    // no sync has run in this process
    assert!(get("/status").starts_with("HTTP/1.1 500"));
    assert!(get("/other").starts_with("HTTP/1.1 404"));
}

fn fork_child(body: impl FnOnce()) -> Pid {
    match unsafe { fork() }.unwrap() {
        ForkResult::Child => {
            body();
            unsafe { nix::libc::_exit(0) }
        }
        ForkResult::Parent { child } => child,
    }
}

#[test]
fn test_wait_child_exit_status() {
    let never = AtomicBool::new(false);
    let child = fork_child(|| ());
    assert!(wait_child(child, Duration::from_secs(10), &never));
    let child = fork_child(|| unsafe { nix::libc::_exit(3); });
    assert!(!wait_child(child, Duration::from_secs(10), &never));
}

#[test]
fn test_wait_child_kills_on_timeout() {
    let never = AtomicBool::new(false);
    let child = fork_child(|| thread::sleep(Duration::from_secs(30)));
    let started = Instant::now();
    assert!(!wait_child(child, Duration::from_millis(300), &never));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(kill(child, None).is_err());
}

#[test]
fn test_wait_child_terminates_on_shutdown() {
    let shutdown = AtomicBool::new(true);
    let child = fork_child(|| thread::sleep(Duration::from_secs(30)));
    let started = Instant::now();
    assert!(!wait_child(child, Duration::from_secs(20), &shutdown));
    assert!(started.elapsed() < Duration::from_secs(10));
}
