pub mod editor;
pub mod screen;

use std::io::IsTerminal;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, Result};
use crate::printer::Printer;
use crate::request;
use crate::resolve::{Auth, ResolvedRequest};
use crate::transport;
use base64::Engine as _;
use editor::EditorAction;
use screen::{LogLine, Screen, MIN_ROWS};

/// Channel depths: input keystrokes, server messages, resize (coalesced).
const INPUT_DEPTH: usize = 64;
const SERVER_DEPTH: usize = 16;

/// How long to wait for the DSR cursor-position reply.
const DSR_TIMEOUT: Duration = Duration::from_secs(1);

/// Run the websocket interactive mode. Returns the process exit code.
pub async fn run(
    req: &ResolvedRequest,
    stderr: &mut Printer,
    cancel: &CancellationToken,
) -> Result<i32> {
    let ws_url = websocket_url(req);

    let mut upgrade = ws_url
        .as_str()
        .into_client_request()
        .map_err(|e| Error::Cli(format!("invalid websocket URL: {e}")))?;
    for kv in &req.headers {
        let name = http::header::HeaderName::from_bytes(kv.key.as_bytes())
            .map_err(|_| Error::Cli(format!("invalid header name '{}'", kv.key)))?;
        let value = http::header::HeaderValue::from_str(&kv.value)
            .map_err(|_| Error::Cli(format!("invalid value for header '{}'", kv.key)))?;
        upgrade.headers_mut().append(name, value);
    }
    if let Some(auth) = auth_header(&req.auth) {
        upgrade.headers_mut().insert(
            http::header::AUTHORIZATION,
            http::header::HeaderValue::from_str(&auth)
                .map_err(|_| Error::Cli("invalid authorization value".into()))?,
        );
    }

    let connector = if ws_url.scheme() == "wss" {
        Some(Connector::Rustls(Arc::new(transport::build_ws_tls_config(
            &req.tls,
        )?)))
    } else {
        Some(Connector::Plain)
    };

    let (stream, _response) = tokio::select! {
        out = connect_async_tls_with_config(upgrade, None, false, connector) => out?,
        () = cancel.cancelled() => {
            return Err(Error::Signal(
                crate::signal::last_signal_name().unwrap_or("SIGINT"),
            ));
        }
    };

    let interactive = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
    let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));

    if interactive && rows >= MIN_ROWS {
        run_tui(req, stream, cols, rows, cancel).await
    } else {
        run_stream_mode(req, stream, cancel).await
    }
}

/// The upgrade URL with the original ws/wss scheme restored and --query
/// pairs applied.
fn websocket_url(req: &ResolvedRequest) -> Url {
    let mut url = request::url_with_query(req);
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme).expect("ws schemes are valid");
    url
}

fn auth_header(auth: &Auth) -> Option<String> {
    match auth {
        Auth::None | Auth::AwsSigv4 { .. } => None,
        Auth::Basic(userpass) => Some(format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(userpass.as_bytes())
        )),
        Auth::Bearer(token) => Some(format!("Bearer {token}")),
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// -- Stream mode --------------------------------------------------------------

/// Non-interactive fallback (piped stdio or a tiny terminal): stdin lines
/// are sent as text frames, traffic is logged line by line.
async fn run_stream_mode(
    req: &ResolvedRequest,
    stream: WsStream,
    cancel: &CancellationToken,
) -> Result<i32> {
    let (mut sink, mut source) = stream.split();
    let mut stdout = Printer::stdout(req.color);

    let (line_tx, mut line_rx) = mpsc::channel::<String>(INPUT_DEPTH);
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(0);
            }
            line = line_rx.recv() => {
                if let Some(line) = line {
                    sink.send(Message::Text(line.clone().into())).await?;
                    stdout.write_str(&format!("→ {line}\n"));
                    stdout.flush()?;
                }
            }
            msg = source.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        if let Some(rendered) = describe_message(&msg) {
                            stdout.write_str(&rendered);
                            stdout.write_str("\n");
                            stdout.flush()?;
                        }
                        if matches!(msg, Message::Close(_)) {
                            return Ok(0);
                        }
                    }
                    Some(Err(err)) => return Err(classify_ws_error(err)),
                    None => return Ok(0),
                }
            }
        }
    }
}

fn describe_message(msg: &Message) -> Option<String> {
    match msg {
        Message::Text(text) => Some(format!("← {text}")),
        Message::Binary(bytes) => Some(format!("← [binary {} bytes]", bytes.len())),
        Message::Close(Some(frame)) => Some(format!("connection closed: {}", frame.code)),
        Message::Close(None) => Some("connection closed".to_string()),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

/// Normal closure is not an error; everything else is.
fn classify_ws_error(err: tokio_tungstenite::tungstenite::Error) -> Error {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            Error::Network("connection closed".into())
        }
        WsError::Protocol(
            tokio_tungstenite::tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
        ) => Error::Network("connection reset without close handshake".into()),
        other => Error::Network(format!("websocket: {other}")),
    }
}

// -- TUI mode -----------------------------------------------------------------

enum UiEvent {
    Input(Vec<u8>),
    Server(std::result::Result<Message, tokio_tungstenite::tungstenite::Error>),
    Resize,
}

async fn run_tui(
    req: &ResolvedRequest,
    stream: WsStream,
    cols: u16,
    rows: u16,
    cancel: &CancellationToken,
) -> Result<i32> {
    crossterm::terminal::enable_raw_mode()
        .map_err(|e| Error::Io(std::io::Error::new(e.kind(), format!("raw mode: {e}"))))?;

    let result = drive_tui(req, stream, cols, rows, cancel).await;

    // Raw mode is restored on every exit path.
    let _ = crossterm::terminal::disable_raw_mode();
    result
}

async fn drive_tui(
    req: &ResolvedRequest,
    stream: WsStream,
    cols: u16,
    rows: u16,
    cancel: &CancellationToken,
) -> Result<i32> {
    let mut stdout = Printer::stdout(req.color);
    let (mut ws_sink, mut ws_source) = stream.split();

    // Stdin bytes flow through a bounded channel; the reader task blocks
    // on the terminal, the UI owner consumes at its own pace.
    let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(INPUT_DEPTH);
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if input_tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Query the cursor row so prior shell output scrolls instead of being
    // overdrawn.
    let cursor_row = query_cursor_row(&mut stdout, &mut input_rx).await;

    let state = Arc::new(Mutex::new(Screen::new(cols, rows)));
    {
        let mut screen = state.lock().expect("screen lock");
        screen.setup(&mut stdout, cursor_row);
    }
    stdout.flush()?;

    let (server_tx, mut server_rx) = mpsc::channel::<UiEvent>(SERVER_DEPTH);
    tokio::spawn(async move {
        while let Some(msg) = ws_source.next().await {
            let done = msg.is_err();
            if server_tx.send(UiEvent::Server(msg)).await.is_err() || done {
                break;
            }
        }
    });

    let (resize_tx, mut resize_rx) = mpsc::channel::<()>(1);
    spawn_resize_watcher(resize_tx);

    let mut exit: Result<i32> = Ok(0);
    'ui: loop {
        let event = tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws_sink.send(Message::Close(None)).await;
                break 'ui;
            }
            bytes = input_rx.recv() => match bytes {
                Some(bytes) => UiEvent::Input(bytes),
                None => break 'ui,
            },
            msg = server_rx.recv() => match msg {
                Some(event) => event,
                None => break 'ui,
            },
            _ = resize_rx.recv() => UiEvent::Resize,
        };

        match event {
            UiEvent::Input(bytes) => {
                // Editor mutation happens under the lock; the websocket
                // send does not.
                let actions = {
                    let mut screen = state.lock().expect("screen lock");
                    screen.editor.handle_bytes(&bytes)
                };
                for action in actions {
                    match action {
                        EditorAction::Redraw => {
                            let mut screen = state.lock().expect("screen lock");
                            screen.draw_input(&mut stdout);
                        }
                        EditorAction::Submit(line) => {
                            if line.is_empty() {
                                continue;
                            }
                            if let Err(err) =
                                ws_sink.send(Message::Text(line.clone().into())).await
                            {
                                exit = Err(classify_ws_error(err));
                                break 'ui;
                            }
                            let mut screen = state.lock().expect("screen lock");
                            screen.push_message(
                                &mut stdout,
                                LogLine {
                                    text: format!("→ {line}"),
                                    dim: false,
                                },
                            );
                        }
                        EditorAction::Terminate => {
                            let _ = ws_sink
                                .send(Message::Close(Some(
                                    tokio_tungstenite::tungstenite::protocol::CloseFrame {
                                        code: CloseCode::Normal,
                                        reason: "".into(),
                                    },
                                )))
                                .await;
                            break 'ui;
                        }
                    }
                }
                stdout.flush()?;
            }
            UiEvent::Server(msg) => {
                match msg {
                    Ok(msg) => {
                        let normal_close = frame_is_normal(&msg);
                        if let Some(rendered) = describe_message(&msg) {
                            let mut screen = state.lock().expect("screen lock");
                            let dim = matches!(msg, Message::Close(_));
                            screen.push_message(
                                &mut stdout,
                                LogLine {
                                    text: rendered,
                                    dim,
                                },
                            );
                        }
                        stdout.flush()?;
                        if matches!(msg, Message::Close(_)) {
                            if !normal_close {
                                log::debug!("server sent non-normal close");
                            }
                            break 'ui;
                        }
                    }
                    Err(err) => {
                        exit = Err(classify_ws_error(err));
                        break 'ui;
                    }
                }
            }
            UiEvent::Resize => {
                let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));
                let mut screen = state.lock().expect("screen lock");
                if rows < MIN_ROWS {
                    // Too small for the chrome; keep state, skip redraw.
                    continue;
                }
                screen.resize(&mut stdout, cols, rows);
                drop(screen);
                stdout.flush()?;
            }
        }
    }

    {
        let mut screen = state.lock().expect("screen lock");
        screen.teardown(&mut stdout);
    }
    stdout.flush()?;
    exit
}

fn frame_is_normal(msg: &Message) -> bool {
    match msg {
        Message::Close(Some(frame)) => frame.code == CloseCode::Normal,
        Message::Close(None) => true,
        _ => false,
    }
}

/// DSR: ask the terminal for the cursor position, defaulting to row 1
/// after a second of silence.
async fn query_cursor_row(stdout: &mut Printer, input: &mut mpsc::Receiver<Vec<u8>>) -> u16 {
    stdout.write_str("\x1b[6n");
    if stdout.flush().is_err() {
        return 1;
    }
    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + DSR_TIMEOUT;
    loop {
        match tokio::time::timeout_at(deadline, input.recv()).await {
            Ok(Some(bytes)) => {
                collected.extend_from_slice(&bytes);
                if let Some(row) = screen::parse_cursor_report(&collected) {
                    return row;
                }
            }
            Ok(None) | Err(_) => return 1,
        }
    }
}

#[cfg(unix)]
fn spawn_resize_watcher(tx: mpsc::Sender<()>) {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::window_change()) {
        Ok(mut stream) => {
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    // try_send coalesces bursts into one pending event.
                    let _ = tx.try_send(());
                }
            });
        }
        Err(err) => log::warn!("installing resize handler: {err}"),
    }
}

#[cfg(not(unix))]
fn spawn_resize_watcher(_tx: mpsc::Sender<()>) {}
