use crate::entities::ActivityState;
use crate::error::AppError;
use crate::middlewares::AuthenticatedUser;
use crate::models::*;
use crate::services::{LifecycleAction, RaffleService};
use actix_web::{HttpResponse, ResponseError, Result, web};
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/raffles",
    tag = "raffle",
    request_body = CreateActivityRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "创建活动成功", body = Activity),
        (status = 400, description = "请求参数错误"),
        (status = 401, description = "未授权")
    )
)]
pub async fn create_activity(
    raffle_service: web::Data<RaffleService>,
    user: AuthenticatedUser,
    request: web::Json<CreateActivityRequest>,
) -> Result<HttpResponse> {
    match raffle_service
        .create_activity(request.into_inner(), user.id())
        .await
    {
        Ok(activity) => Ok(HttpResponse::Ok().json(ApiResponse::success(activity))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/raffles",
    tag = "raffle",
    params(
        ("group_id" = String, Query, description = "群组ID"),
        ("state" = Option<ActivityState>, Query, description = "状态: pending/active/drawn/cancelled")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取活动列表成功", body = [Activity]),
        (status = 401, description = "未授权")
    )
)]
pub async fn list_activities(
    raffle_service: web::Data<RaffleService>,
    query: web::Query<ActivityListQuery>,
) -> Result<HttpResponse> {
    match raffle_service
        .list_activities(&query.group_id, query.state)
        .await
    {
        Ok(list) => Ok(HttpResponse::Ok().json(ApiResponse::success(list))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/raffles/open",
    tag = "raffle",
    params(
        ("group_id" = String, Query, description = "群组ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取进行中的活动成功", body = [Activity]),
        (status = 401, description = "未授权")
    )
)]
pub async fn list_open_activities(
    raffle_service: web::Data<RaffleService>,
    query: web::Query<GroupQuery>,
) -> Result<HttpResponse> {
    match raffle_service.list_open_activities(&query.group_id).await {
        Ok(list) => Ok(HttpResponse::Ok().json(ApiResponse::success(list))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/raffles/history",
    tag = "raffle",
    params(
        ("group_id" = String, Query, description = "群组ID"),
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取历史活动成功", body = ActivityPage),
        (status = 401, description = "未授权")
    )
)]
pub async fn list_history(
    raffle_service: web::Data<RaffleService>,
    query: web::Query<ActivityHistoryQuery>,
) -> Result<HttpResponse> {
    match raffle_service.list_history(&query).await {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/raffles/match",
    tag = "raffle",
    params(
        ("group_id" = String, Query, description = "群组ID"),
        ("keyword" = Option<String>, Query, description = "报名口令"),
        ("gesture_id" = Option<String>, Query, description = "报名手势")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "匹配到的进行中活动", body = [Activity]),
        (status = 401, description = "未授权")
    )
)]
pub async fn match_join(
    raffle_service: web::Data<RaffleService>,
    query: web::Query<JoinMatchQuery>,
) -> Result<HttpResponse> {
    match raffle_service
        .match_join(
            &query.group_id,
            query.keyword.as_deref(),
            query.gesture_id.as_deref(),
        )
        .await
    {
        Ok(list) => Ok(HttpResponse::Ok().json(ApiResponse::success(list))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/raffles/failed",
    tag = "raffle-admin",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "开奖失败待处理的活动", body = [Activity]),
        (status = 401, description = "未授权")
    )
)]
pub async fn list_failed_draws(raffle_service: web::Data<RaffleService>) -> Result<HttpResponse> {
    match raffle_service.list_failed_draws().await {
        Ok(list) => Ok(HttpResponse::Ok().json(ApiResponse::success(list))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/raffles/{id}",
    tag = "raffle",
    params(
        ("id" = Uuid, Path, description = "活动ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取活动详情成功", body = ActivityDetail),
        (status = 404, description = "活动不存在"),
        (status = 401, description = "未授权")
    )
)]
pub async fn get_activity(
    raffle_service: web::Data<RaffleService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    match raffle_service.get_activity_detail(id).await {
        Ok(Some(detail)) => Ok(HttpResponse::Ok().json(ApiResponse::success(detail))),
        Ok(None) => Ok(AppError::activity_not_found(id).error_response()),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/raffles/{id}/join",
    tag = "raffle",
    params(
        ("id" = Uuid, Path, description = "活动ID")
    ),
    request_body = JoinRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "报名成功或已报名", body = JoinResult),
        (status = 404, description = "活动不存在"),
        (status = 409, description = "活动不在报名中"),
        (status = 401, description = "未授权")
    )
)]
pub async fn join(
    raffle_service: web::Data<RaffleService>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    request: web::Json<JoinRequest>,
) -> Result<HttpResponse> {
    match raffle_service
        .join(path.into_inner(), user.id(), &request.display_name)
        .await
    {
        Ok(JoinResult::ActivityNotOpen { state }) => {
            Ok(AppError::conflict(LifecycleAction::Join.as_str(), state).error_response())
        }
        Ok(result) => Ok(HttpResponse::Ok().json(ApiResponse::success(result))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/raffles/{id}/participants/me",
    tag = "raffle",
    params(
        ("id" = Uuid, Path, description = "活动ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "是否已报名", body = HasJoinedResponse),
        (status = 404, description = "活动不存在"),
        (status = 401, description = "未授权")
    )
)]
pub async fn has_joined(
    raffle_service: web::Data<RaffleService>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    match raffle_service.has_joined(path.into_inner(), user.id()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/raffles/{id}/cancel",
    tag = "raffle",
    params(
        ("id" = Uuid, Path, description = "活动ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "取消成功", body = CancelResponse),
        (status = 403, description = "非创建者"),
        (status = 404, description = "活动不存在"),
        (status = 409, description = "活动已开奖或已取消"),
        (status = 401, description = "未授权")
    )
)]
pub async fn cancel(
    raffle_service: web::Data<RaffleService>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    match raffle_service.cancel(path.into_inner(), user.id()).await {
        Ok(activity) => Ok(HttpResponse::Ok().json(ApiResponse::success(CancelResponse { activity }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/raffles/{id}/announcement",
    tag = "raffle",
    params(
        ("id" = Uuid, Path, description = "活动ID")
    ),
    request_body = AttachAnnouncementRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "公告引用已保存", body = Activity),
        (status = 404, description = "活动不存在"),
        (status = 409, description = "活动已结束"),
        (status = 401, description = "未授权")
    )
)]
pub async fn attach_announcement(
    raffle_service: web::Data<RaffleService>,
    path: web::Path<Uuid>,
    request: web::Json<AttachAnnouncementRequest>,
) -> Result<HttpResponse> {
    match raffle_service
        .attach_announcement(path.into_inner(), &request.message_ref)
        .await
    {
        Ok(activity) => Ok(HttpResponse::Ok().json(ApiResponse::success(activity))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/raffles/{id}/redraw",
    tag = "raffle-admin",
    params(
        ("id" = Uuid, Path, description = "活动ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "已重新触发开奖"),
        (status = 404, description = "活动不存在"),
        (status = 409, description = "活动不在 active 状态"),
        (status = 401, description = "未授权")
    )
)]
pub async fn redraw(
    raffle_service: web::Data<RaffleService>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    log::info!("Redraw of activity {id} requested by {}", user.id());
    match raffle_service.retrigger_draw(id).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(ApiResponse::success(outcome))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/raffles/{id}",
    tag = "raffle",
    params(
        ("id" = Uuid, Path, description = "活动ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "删除成功"),
        (status = 403, description = "非创建者"),
        (status = 404, description = "活动不存在"),
        (status = 409, description = "活动进行中，不能删除"),
        (status = 401, description = "未授权")
    )
)]
pub async fn delete_activity(
    raffle_service: web::Data<RaffleService>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    match raffle_service.delete_activity(id, user.id()).await {
        Ok(()) => Ok(HttpResponse::Ok()
            .json(ApiResponse::success(id).with_message("Activity deleted"))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn raffle_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/raffles")
            .route("", web::post().to(create_activity))
            .route("", web::get().to(list_activities))
            .route("/open", web::get().to(list_open_activities))
            .route("/history", web::get().to(list_history))
            .route("/match", web::get().to(match_join))
            .route("/failed", web::get().to(list_failed_draws))
            .route("/{id}", web::get().to(get_activity))
            .route("/{id}", web::delete().to(delete_activity))
            .route("/{id}/join", web::post().to(join))
            .route("/{id}/participants/me", web::get().to(has_joined))
            .route("/{id}/cancel", web::post().to(cancel))
            .route("/{id}/announcement", web::put().to(attach_announcement))
            .route("/{id}/redraw", web::post().to(redraw)),
    );
}
