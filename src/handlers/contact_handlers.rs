//! Contact form intake and the admin inbox under `/api/contact`.

use super::{
    auth::CurrentUser,
    extract::{ApiJson, ApiPath, ApiQuery},
    response::ApiResponse,
    upload::Payload,
};
use crate::{
    AppState,
    errors::AppError,
    models::{
        message::{Message, MessageStatus},
        user::Permission,
    },
    services::message_service::{ClientInfo, ContactForm, MessageFilter, MessagePage, MessageStats},
};
use axum::{
    extract::{ConnectInfo, FromRequestParts, State},
    http::{StatusCode, header, request::Parts},
};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, net::SocketAddr};
use uuid::Uuid;

/// Caller address and agent. Prefers proxy headers over the socket peer.
pub struct Client(pub ClientInfo);

impl<S> FromRequestParts<S> for Client
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let ip_address = header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| header("x-real-ip"))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            });
        Ok(Self(ClientInfo {
            ip_address,
            user_agent: header(header::USER_AGENT.as_str()),
        }))
    }
}

#[derive(Serialize, Debug)]
pub struct Submitted {
    pub id: Uuid,
    pub status: MessageStatus,
}

#[derive(Deserialize, Debug)]
pub struct StatusUpdate {
    pub status: MessageStatus,
}

#[derive(Deserialize, Debug)]
pub struct ReplyRequest {
    pub content: Option<String>,
}

/// POST `/api/contact/submit`: form fields (or a `data` part) plus an
/// optional `attachment`.
pub async fn submit(
    State(state): State<AppState>,
    Client(client): Client,
    mut payload: Payload,
) -> Result<ApiResponse<Submitted>, AppError> {
    let attachment = payload.take_file("attachment")?;
    let form: ContactForm = payload.parse()?;
    let outcome = state.messages.submit(form, attachment, client).await?;
    let outcome = outcome.map(|m| Submitted {
        id: m.id,
        status: m.status,
    });
    Ok(ApiResponse::outcome(outcome)
        .status(StatusCode::CREATED)
        .message("Vaša poruka je uspešno poslata. Kontaktiraćemo vas uskoro."))
}

pub async fn list_messages(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(filter): ApiQuery<MessageFilter>,
) -> Result<ApiResponse<MessagePage>, AppError> {
    user.require_permission(Permission::ManageMessages)?;
    Ok(ApiResponse::ok(state.messages.list(filter).await?))
}

pub async fn stats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<ApiResponse<MessageStats>, AppError> {
    user.require_permission(Permission::ManageMessages)?;
    Ok(ApiResponse::ok(state.messages.stats().await?))
}

/// GET `/api/contact/messages/{id}`: opening a new message marks it read.
pub async fn get_message(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiResponse<Message>, AppError> {
    user.require_permission(Permission::ManageMessages)?;
    Ok(ApiResponse::ok(state.messages.get(id).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StatusUpdate>,
) -> Result<ApiResponse<Message>, AppError> {
    user.require_permission(Permission::ManageMessages)?;
    let message = state.messages.update_status(id, req.status).await?;
    Ok(ApiResponse::ok(message).message("Message status updated"))
}

pub async fn reply(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ReplyRequest>,
) -> Result<ApiResponse<Message>, AppError> {
    user.require_permission(Permission::ManageMessages)?;
    let outcome = state.messages.reply(id, req.content, user.id()).await?;
    Ok(ApiResponse::outcome(outcome).message("Reply sent successfully"))
}

pub async fn delete_message(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::ManageMessages)?;
    let outcome = state.messages.delete(id).await?;
    Ok(ApiResponse::done("Message deleted successfully").effects(outcome.side_effects))
}
