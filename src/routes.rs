use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::auth::AuthUser;
use crate::chat;
use crate::chat_models::{
    Chat, ChatListResponse, Message, MessageListResponse, OpenChatRequest, SendMessageRequest,
};
use crate::error::ApiResult;
use crate::feed::{self, FeedQuery};
use crate::matching::{self, SwipeOutcome};
use crate::media::ImageUpload;
use crate::models::{
    AvailabilityRequest, Comment, CommentListResponse, CommentRequest, CreatePostRequest,
    CreateTradeRequest, LikeResponse, MatchListResponse, OfferRequest, Post, PostPage,
    SaveResponse, SwipeResponse, Trade, TradeListResponse,
};
use crate::profile;
use crate::state::AppState;
use crate::trades::{self, QueueMode};
use crate::unread::{self, UnreadSummary};
use crate::user_models::{
    AuthResponse, ConfirmPasswordResetRequest, PasswordResetRequest, PasswordResetResponse,
    SignInRequest, SignUpRequest, UpdateProfileRequest, User, VerifyEmailRequest,
};
use crate::ws;

pub fn router(state: Arc<AppState>) -> Router {
    let media = ServeDir::new(state.media.root());

    Router::new()
        .route("/health", get(health))
        .route("/auth/signup", post(sign_up))
        .route("/auth/signin", post(sign_in))
        .route("/auth/signout", post(sign_out))
        .route("/auth/password-reset", post(send_password_reset))
        .route("/auth/password-reset/confirm", post(confirm_password_reset))
        .route("/auth/verify-email", post(verify_email))
        .route("/me", get(me).put(update_me))
        .route("/me/avatar", put(set_avatar))
        .route("/me/saves", get(saved_posts))
        .route("/users/:username", get(user_by_username))
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/:id", get(get_post).delete(delete_post))
        .route("/posts/:id/like", post(like_post))
        .route("/posts/:id/save", post(save_post))
        .route("/posts/:id/comments", get(list_comments).post(add_comment))
        .route("/trades", post(create_trade))
        .route("/trades/mine", get(my_trades))
        .route("/trades/queue", get(trade_queue))
        .route("/trades/picker", get(trade_picker))
        .route("/trades/:id/availability", post(set_availability))
        .route("/trades/:id/like", post(like_trade))
        .route("/trades/:id/offer", post(offer_trade))
        .route("/matches", get(list_matches))
        .route("/chats", get(list_chats).post(open_chat))
        .route("/chats/:id/messages", get(list_messages).post(send_message))
        .route("/messages/:id/read", post(mark_read))
        .route("/unread", get(unread_summary))
        .route("/ws/unread", get(ws::unread_ws))
        .nest_service("/media", media)
        .with_state(state)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

// --- auth -----------------------------------------------------------------

async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignUpRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let response = state.auth.sign_up(payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignInRequest>,
) -> ApiResult<Json<AuthResponse>> {
    Ok(Json(state.auth.sign_in(payload).await?))
}

async fn sign_out(State(state): State<Arc<AppState>>, user: AuthUser) -> StatusCode {
    state.auth.sign_out(&user.token).await;
    StatusCode::NO_CONTENT
}

async fn send_password_reset(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PasswordResetRequest>,
) -> ApiResult<Json<PasswordResetResponse>> {
    let reset_code = state.auth.send_password_reset(&payload.email).await?;
    Ok(Json(PasswordResetResponse {
        message: "If an account exists for that email, a reset link is on its way.".to_string(),
        reset_code,
    }))
}

async fn confirm_password_reset(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ConfirmPasswordResetRequest>,
) -> ApiResult<StatusCode> {
    state
        .auth
        .confirm_password_reset(&payload.code, &payload.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyEmailRequest>,
) -> ApiResult<StatusCode> {
    state.auth.verify_email(&payload.code).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- profile --------------------------------------------------------------

async fn me(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Json<User>> {
    Ok(Json(profile::get_profile(&state.store, &user.uid).await?))
}

async fn update_me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    Ok(Json(
        profile::update_profile(&state.store, &user.uid, payload).await?,
    ))
}

async fn set_avatar(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(image): Json<ImageUpload>,
) -> ApiResult<Json<User>> {
    Ok(Json(
        profile::set_avatar(&state.store, &state.media, &user.uid, &image).await?,
    ))
}

async fn user_by_username(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> ApiResult<Json<User>> {
    Ok(Json(profile::find_by_username(&state.store, &username).await?))
}

#[derive(Serialize, Deserialize)]
pub struct SavedPostsResponse {
    pub posts: Vec<Post>,
}

async fn saved_posts(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<SavedPostsResponse>> {
    let posts = profile::saved_posts(&state.store, &user.uid).await?;
    Ok(Json(SavedPostsResponse { posts }))
}

// --- feed -----------------------------------------------------------------

async fn list_posts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<PostPage>> {
    Ok(Json(feed::list_posts(&state.store, &query).await?))
}

async fn create_post(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let post = feed::create_post(&state.store, &state.media, &user.uid, payload).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn get_post(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<Post>> {
    Ok(Json(feed::get_post(&state.store, &id).await?))
}

async fn delete_post(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    feed::delete_post(&state.store, &user.uid, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn like_post(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<LikeResponse>> {
    let (liked, like_count) = feed::toggle_like(&state.store, &user.uid, &id).await?;
    Ok(Json(LikeResponse { liked, like_count }))
}

async fn save_post(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<SaveResponse>> {
    let (saved, save_count) = profile::toggle_save(&state.store, &user.uid, &id).await?;
    Ok(Json(SaveResponse { saved, save_count }))
}

async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CommentListResponse>> {
    let comments = feed::list_comments(&state.store, &id).await?;
    Ok(Json(CommentListResponse { comments }))
}

async fn add_comment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<CommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let comment = feed::add_comment(&state.store, &user.uid, &id, &payload.text).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

// --- trades ---------------------------------------------------------------

async fn create_trade(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CreateTradeRequest>,
) -> ApiResult<(StatusCode, Json<Trade>)> {
    let trade = trades::create_trade(&state.store, &state.media, &user.uid, payload).await?;
    Ok((StatusCode::CREATED, Json(trade)))
}

async fn my_trades(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Json<TradeListResponse>> {
    let trades = trades::my_trades(&state.store, &user.uid).await?;
    Ok(Json(TradeListResponse { trades }))
}

#[derive(Debug, Deserialize)]
pub struct QueueParams {
    #[serde(default)]
    pub mode: QueueMode,
}

async fn trade_queue(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<QueueParams>,
) -> Json<TradeListResponse> {
    let trades = trades::load_queue(&state.store, &user.uid, params.mode).await;
    Json(TradeListResponse { trades })
}

async fn trade_picker(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Json<TradeListResponse>> {
    let trades = trades::picker(&state.store, &user.uid).await?;
    Ok(Json(TradeListResponse { trades }))
}

async fn set_availability(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<AvailabilityRequest>,
) -> ApiResult<Json<Trade>> {
    Ok(Json(
        trades::set_availability(&state.store, &user.uid, &id, payload.available).await?,
    ))
}

fn swipe_response(outcome: SwipeOutcome) -> Json<SwipeResponse> {
    Json(SwipeResponse {
        trade_match: outcome.trade_match,
        mutual: outcome.mutual,
        chat_id: outcome.chat_id,
    })
}

async fn like_trade(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<SwipeResponse>> {
    let outcome = matching::like(&state.store, &user.uid, &id).await?;
    Ok(swipe_response(outcome))
}

async fn offer_trade(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<OfferRequest>,
) -> ApiResult<Json<SwipeResponse>> {
    let outcome = matching::offer(&state.store, &user.uid, &id, &payload.offered_item).await?;
    Ok(swipe_response(outcome))
}

async fn list_matches(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Json<MatchListResponse>> {
    let matches = matching::matches_for(&state.store, &user.uid).await?;
    Ok(Json(MatchListResponse { matches }))
}

// --- chat -----------------------------------------------------------------

async fn list_chats(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Json<ChatListResponse>> {
    let chats = chat::list_chats(&state.store, &user.uid).await?;
    Ok(Json(ChatListResponse { chats }))
}

async fn open_chat(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<OpenChatRequest>,
) -> ApiResult<Json<Chat>> {
    Ok(Json(
        chat::open_chat_with(&state.store, &user.uid, &payload.user_id).await?,
    ))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageListResponse>> {
    let messages = chat::list_messages(&state.store, &id, &user.uid).await?;
    Ok(Json(MessageListResponse { messages }))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let message = chat::send_message(
        &state.store,
        &state.media,
        &id,
        &user.uid,
        &payload.text,
        payload.image.as_ref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Message>> {
    Ok(Json(chat::mark_read(&state.store, &id, &user.uid).await?))
}

async fn unread_summary(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Json<UnreadSummary>> {
    Ok(Json(unread::summary(&state.store, &user.uid).await?))
}
