use log::{debug, warn};
use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, Responder, guard, http::Method, web};
use actix_ws::{Message, MessageStream, Session};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::backend::GpioBackend;
use crate::config::{EdgeDetect, PinMode, Pull};
use crate::error::AppError;
use crate::events::EdgeEvent;
use crate::gpio::GpioManager;

pub struct AppState<B: GpioBackend + 'static> {
    pub manager: Arc<GpioManager<B>>,
}

impl<B: GpioBackend + 'static> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
        }
    }
}

#[derive(Deserialize)]
struct EdgePayload {
    edge: EdgeDetect,
}

#[derive(Deserialize, Default)]
struct EventsQuery {
    limit: Option<usize>,
}

async fn handle_event_websocket(
    mut session: Session,
    mut client_stream: MessageStream,
    rx: broadcast::Receiver<EdgeEvent>,
    pin_filter: Option<usize>,
) {
    let mut events = BroadcastStream::new(rx);

    loop {
        tokio::select! {
            msg = client_stream.recv() => {
                let Some(msg) = msg else { break; };

                match msg {
                    Ok(Message::Ping(bytes)) => {
                        let _ = session.pong(&bytes).await;
                    }
                    Ok(Message::Close(reason)) => {
                        let _ = session.close(reason).await;
                        break;
                    }
                    Ok(Message::Text(_))
                    | Ok(Message::Binary(_))
                    | Ok(Message::Pong(_))
                    | Ok(Message::Continuation(_))
                    | Ok(Message::Nop) => {}
                    Err(_) => break,
                }
            }
            event = events.next() => {
                let Some(event) = event else { break; };

                match event {
                    Ok(event) => {
                        if pin_filter.map(|p| p == event.pin).unwrap_or(true) {
                            if let Ok(text) = serde_json::to_string(&event) {
                                if session.text(text).await.is_err() {
                                    warn!("WebSocket client disconnected");
                                    break;
                                }
                            }
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(n)) => {
                        let notice = AppError::ResourceUnavailable(format!("Event stream lagged by {n} messages"));
                        if session.text(notice.to_string()).await.is_err() {
                            warn!("WebSocket client lagged and disconnected");
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn resource(path: &str, allowed: &[Method]) -> actix_web::Resource {
    web::resource(path).route(
        web::route()
            .guard(guard_not_methods(allowed.to_vec()))
            .to(method_not_allowed),
    )
}

impl<B: GpioBackend + 'static> AppState<B> {
    pub fn api_scope(&self, base_path: &str) -> actix_web::Scope {
        web::scope(base_path)
            .service(
                resource("/gpios", &[Method::GET]).route(web::get().to(list_gpios::<B>)),
            )
            .service(
                resource("/gpios/events", &[Method::GET])
                    .route(web::get().to(events_ws_all::<B>)),
            )
            .service(resource("/stats", &[Method::GET]).route(web::get().to(get_stats::<B>)))
            .service(
                resource("/gpio/{pin_id}", &[Method::GET])
                    .route(web::get().to(pin_status::<B>)),
            )
            .service(
                resource("/gpio/{pin_id}/mode", &[Method::POST])
                    .route(web::post().to(set_mode::<B>)),
            )
            .service(
                resource("/gpio/{pin_id}/pull", &[Method::POST])
                    .route(web::post().to(set_pull::<B>)),
            )
            .service(
                resource("/gpio/{pin_id}/value", &[Method::GET, Method::POST])
                    .route(web::get().to(get_value::<B>))
                    .route(web::post().to(set_value::<B>)),
            )
            .service(
                resource("/gpio/{pin_id}/edge", &[Method::GET, Method::POST])
                    .route(web::get().to(get_edge::<B>))
                    .route(web::post().to(set_edge::<B>)),
            )
            .service(
                resource("/gpio/{pin_id}/event", &[Method::GET])
                    .route(web::get().to(get_last_event::<B>)),
            )
            .service(
                resource("/gpio/{pin_id}/events", &[Method::GET])
                    .route(web::get().to(get_events::<B>)),
            )
            .service(
                resource("/gpio/{pin_id}/events/ws", &[Method::GET])
                    .route(web::get().to(events_ws_pin::<B>)),
            )
    }
}

async fn list_gpios<B: GpioBackend + 'static>(
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    Ok(web::Json(state.manager.list_pins()))
}

async fn get_stats<B: GpioBackend + 'static>(
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    Ok(web::Json(state.manager.stats()))
}

async fn pin_status<B: GpioBackend + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_pin_id(&req)?;
    let status = state.manager.pin_status(pin_id)?;

    Ok(web::Json(status))
}

async fn set_mode<B: GpioBackend + 'static>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_available_pin(&req, state.get_ref())?;
    let mode: PinMode = parse_word_payload(&body, "mode")?;

    state.manager.configure_pin(pin_id, mode);

    Ok(web::Json(state.manager.pin_status(pin_id)?))
}

async fn set_pull<B: GpioBackend + 'static>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_available_pin(&req, state.get_ref())?;
    let pull: Pull = parse_word_payload(&body, "pull")?;

    state.manager.set_polarity(pin_id, pull);

    Ok(web::Json(state.manager.pin_status(pin_id)?))
}

async fn get_value<B: GpioBackend + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_available_pin(&req, state.get_ref())?;

    Ok(web::Json(state.manager.read_level(pin_id)))
}

async fn set_value<B: GpioBackend + 'static>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_available_pin(&req, state.get_ref())?;
    let value = parse_value_payload(&body)?;
    if value > 1 {
        return Err(AppError::InvalidValue("Value must be 0 or 1".into()));
    }

    state.manager.write_level(pin_id, value);

    Ok(HttpResponse::Ok())
}

async fn get_edge<B: GpioBackend + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_available_pin(&req, state.get_ref())?;

    Ok(web::Json(state.manager.pin_status(pin_id)?.edge))
}

async fn set_edge<B: GpioBackend + 'static>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_available_pin(&req, state.get_ref())?;
    if body.is_empty() {
        return Err(AppError::InvalidValue("Empty edge payload".into()));
    }
    let payload: EdgePayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::InvalidValue(format!("Invalid edge payload: {e}")))?;

    match payload.edge {
        EdgeDetect::None => state.manager.clear_interrupt(pin_id),
        edge => state.manager.register_interrupt(
            pin_id,
            edge,
            Arc::new(move || debug!("interrupt on pin {pin_id}")),
        ),
    }

    Ok(web::Json(payload.edge))
}

async fn get_last_event<B: GpioBackend + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_pin_id(&req)?;

    match state.manager.get_last_event(pin_id)? {
        Some(event) => Ok(HttpResponse::Ok().json(event)),
        None => Ok(HttpResponse::Ok().finish()),
    }
}

async fn get_events<B: GpioBackend + 'static>(
    req: HttpRequest,
    query: web::Query<EventsQuery>,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_pin_id(&req)?;

    let events = state.manager.get_events(pin_id, query.limit)?;

    Ok(web::Json(events))
}

async fn events_ws_all<B: GpioBackend + 'static>(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState<B>>,
) -> Result<HttpResponse, AppError> {
    open_event_websocket(&req, stream, state.get_ref(), None)
}

async fn events_ws_pin<B: GpioBackend + 'static>(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState<B>>,
) -> Result<HttpResponse, AppError> {
    let pin_id = parse_available_pin(&req, state.get_ref())?;
    open_event_websocket(&req, stream, state.get_ref(), Some(pin_id))
}

fn open_event_websocket<B: GpioBackend + 'static>(
    req: &HttpRequest,
    stream: web::Payload,
    state: &AppState<B>,
    pin_filter: Option<usize>,
) -> Result<HttpResponse, AppError> {
    let rx = state.manager.subscribe_events();
    let (response, session, client_stream) = actix_ws::handle(req, stream)
        .map_err(|e| AppError::ResourceUnavailable(format!("Websocket error: {e}")))?;

    actix_web::rt::spawn(async move {
        handle_event_websocket(session, client_stream, rx, pin_filter).await;
    });

    Ok(response)
}

fn payload_text(body: &[u8]) -> Result<&str, AppError> {
    if body.is_empty() {
        return Err(AppError::InvalidValue("Empty payload".into()));
    }
    std::str::from_utf8(body)
        .map(str::trim)
        .map_err(|_| AppError::InvalidValue("Payload must be valid UTF-8".into()))
}

fn parse_value_payload(body: &[u8]) -> Result<u8, AppError> {
    payload_text(body)?
        .parse::<u8>()
        .map_err(|_| AppError::InvalidValue("Value must be an integer".into()))
}

/// Accepts a bare word such as `out` or a JSON string such as `"out"`.
fn parse_word_payload<T: DeserializeOwned>(body: &[u8], what: &str) -> Result<T, AppError> {
    let text = payload_text(body)?.trim_matches('"');
    serde_json::from_value(serde_json::Value::String(text.to_owned()))
        .map_err(|_| AppError::InvalidValue(format!("Unknown {what}: {text}")))
}

fn parse_pin_id(req: &HttpRequest) -> Result<usize, AppError> {
    let pin_id = req
        .match_info()
        .get("pin_id")
        .ok_or_else(|| AppError::InvalidValue("Missing pin id".into()))?;
    let pin_id = pin_id
        .parse::<usize>()
        .map_err(|_| AppError::InvalidValue("Invalid pin id".into()))?;

    Ok(pin_id)
}

fn parse_available_pin<B: GpioBackend + 'static>(
    req: &HttpRequest,
    state: &AppState<B>,
) -> Result<usize, AppError> {
    let pin_id = parse_pin_id(req)?;
    state.manager.resolve_pin(pin_id)?;

    Ok(pin_id)
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().finish()
}

fn guard_not_methods(allowed: Vec<Method>) -> impl guard::Guard {
    guard::fn_guard(move |ctx| !allowed.iter().any(|m| m == ctx.head().method))
}
