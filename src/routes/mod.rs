pub mod accounts;
pub mod analytics;
pub mod auth;
pub mod catalog;
pub mod collaborations;
pub mod community;
pub mod designs;
pub mod health;
pub mod materials;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod quotes;
pub mod reviews;
pub mod rfqs;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Build the application router: `/health` at the root, everything else
/// under `/api/v1`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api_v1())
}

fn api_v1() -> Router<Arc<AppState>> {
    Router::new()
        .merge(account_routes())
        .merge(listing_routes())
        .merge(order_routes())
        .merge(payment_routes())
        .merge(collaboration_routes())
        .merge(community_routes())
        .merge(review_routes())
        .merge(analytics_routes())
        .merge(notification_routes())
}

fn account_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Auth proxy
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/session", get(auth::get_session))
        .route("/auth/refresh", post(auth::refresh_token))
        // Current user
        .route("/users/me", get(accounts::get_me).patch(accounts::update_me))
        // Profiles
        .route("/profiles", get(accounts::list_profiles))
        .route(
            "/profiles/me",
            get(accounts::get_my_profile).patch(accounts::update_my_profile),
        )
        .route("/profiles/:id", get(accounts::get_profile))
}

fn listing_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Categories
        .route(
            "/categories",
            get(catalog::list_categories).post(catalog::create_category),
        )
        .route(
            "/categories/:slug",
            get(catalog::get_category)
                .patch(catalog::update_category)
                .delete(catalog::delete_category),
        )
        .route(
            "/categories/:slug/subcategories",
            get(catalog::list_subcategories),
        )
        .route(
            "/categories/:slug/materials",
            get(catalog::list_category_materials),
        )
        .route(
            "/categories/:slug/designs",
            get(catalog::list_category_designs),
        )
        // Tags and certifications
        .route("/tags", get(catalog::list_tags).post(catalog::create_tag))
        .route(
            "/tags/:id",
            patch(catalog::update_tag).delete(catalog::delete_tag),
        )
        .route(
            "/certifications",
            get(catalog::list_certifications).post(catalog::create_certification),
        )
        .route(
            "/certifications/:id",
            patch(catalog::update_certification).delete(catalog::delete_certification),
        )
        // Materials
        .route(
            "/materials",
            get(materials::list_materials).post(materials::create_material),
        )
        .route(
            "/materials/:slug",
            get(materials::get_material)
                .patch(materials::update_material)
                .delete(materials::delete_material),
        )
        // Designs
        .route(
            "/designs",
            get(designs::list_designs).post(designs::create_design),
        )
        .route(
            "/designs/:slug",
            get(designs::get_design)
                .patch(designs::update_design)
                .delete(designs::delete_design),
        )
        .route(
            "/designs/:slug/tech-packs",
            get(designs::list_tech_packs).post(designs::add_tech_pack),
        )
}

fn order_routes() -> Router<Arc<AppState>> {
    Router::new()
        // RFQs
        .route("/rfqs", get(rfqs::list_rfqs).post(rfqs::create_rfq))
        .route(
            "/rfqs/:id",
            get(rfqs::get_rfq)
                .patch(rfqs::update_rfq)
                .delete(rfqs::delete_rfq),
        )
        .route("/rfqs/:id/quotes", get(rfqs::list_rfq_quotes))
        .route("/rfqs/:id/award", post(rfqs::award_quote))
        .route("/rfqs/:id/change-status", post(rfqs::change_status))
        // Quotes
        .route("/quotes", get(quotes::list_quotes).post(quotes::create_quote))
        .route(
            "/quotes/:id",
            get(quotes::get_quote)
                .patch(quotes::update_quote)
                .delete(quotes::delete_quote),
        )
        .route("/quotes/:id/accept", post(quotes::accept_quote))
        .route("/quotes/:id/reject", post(quotes::reject_quote))
        // Orders
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route(
            "/orders/:id",
            get(orders::get_order)
                .patch(orders::update_order)
                .delete(orders::delete_order),
        )
        .route("/orders/:id/items", get(orders::list_order_items))
        .route("/orders/:id/update-status", post(orders::update_order_status))
        .route("/orders/:id/initiate-payment", post(orders::initiate_payment))
}

fn payment_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/payments/plans",
            get(payments::list_plans).post(payments::create_plan),
        )
        .route(
            "/payments/plans/:id",
            get(payments::get_plan).patch(payments::update_plan),
        )
        .route(
            "/payments/subscriptions",
            post(payments::create_subscription),
        )
        .route(
            "/payments/subscriptions/me",
            get(payments::get_my_subscription),
        )
        .route(
            "/payments/subscriptions/cancel",
            post(payments::cancel_subscription),
        )
        .route(
            "/payments/subscriptions/feature",
            get(payments::check_feature),
        )
        .route("/payments/transactions", get(payments::list_transactions))
        .route(
            "/payments/transactions/:id",
            get(payments::get_transaction),
        )
        // Stripe calls this unauthenticated; the signature header is the credential
        .route("/payments/webhooks/stripe", post(payments::stripe_webhook))
}

fn collaboration_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Projects
        .route(
            "/projects",
            get(collaborations::list_projects).post(collaborations::create_project),
        )
        .route(
            "/projects/:id",
            get(collaborations::get_project)
                .patch(collaborations::update_project)
                .delete(collaborations::delete_project),
        )
        .route("/projects/:id/members", post(collaborations::add_member))
        .route(
            "/projects/:id/members/:user_id",
            delete(collaborations::remove_member),
        )
        .route("/projects/:id/tasks", get(collaborations::list_project_tasks))
        .route("/projects/:id/files", get(collaborations::list_project_files))
        .route(
            "/projects/:id/comments",
            get(collaborations::list_project_comments),
        )
        // Tasks
        .route(
            "/tasks",
            get(collaborations::list_tasks).post(collaborations::create_task),
        )
        .route(
            "/tasks/:id",
            get(collaborations::get_task)
                .patch(collaborations::update_task)
                .delete(collaborations::delete_task),
        )
        // Files and comments
        .route("/files", post(collaborations::add_file))
        .route("/files/:id", delete(collaborations::delete_file))
        .route(
            "/comments",
            get(collaborations::list_comments).post(collaborations::create_comment),
        )
        .route(
            "/comments/:id",
            patch(collaborations::update_comment).delete(collaborations::delete_comment),
        )
        // Message threads
        .route(
            "/threads",
            get(collaborations::list_threads).post(collaborations::create_thread),
        )
        .route("/threads/:id", get(collaborations::get_thread))
        .route(
            "/threads/:id/messages",
            get(collaborations::list_messages).post(collaborations::send_message),
        )
}

fn community_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/forum/categories",
            get(community::list_forum_categories).post(community::create_forum_category),
        )
        .route(
            "/forum/categories/:slug",
            get(community::get_forum_category)
                .patch(community::update_forum_category)
                .delete(community::delete_forum_category),
        )
        .route(
            "/forum/threads",
            get(community::list_forum_threads).post(community::create_forum_thread),
        )
        .route(
            "/forum/threads/:slug",
            get(community::get_forum_thread)
                .patch(community::update_forum_thread)
                .delete(community::delete_forum_thread),
        )
        .route("/forum/threads/:slug/toggle-pin", post(community::toggle_pin))
        .route("/forum/threads/:slug/toggle-lock", post(community::toggle_lock))
        .route(
            "/forum/posts",
            get(community::list_forum_posts).post(community::create_forum_post),
        )
        .route(
            "/forum/posts/:id",
            get(community::get_forum_post)
                .patch(community::update_forum_post)
                .delete(community::delete_forum_post),
        )
        // Showcases
        .route(
            "/showcases",
            get(community::list_showcases).post(community::create_showcase),
        )
        .route(
            "/showcases/:id",
            get(community::get_showcase)
                .patch(community::update_showcase)
                .delete(community::delete_showcase),
        )
        .route("/showcases/:id/items", post(community::add_showcase_item))
        .route(
            "/showcases/:id/items/:item_id",
            patch(community::update_showcase_item).delete(community::delete_showcase_item),
        )
}

fn review_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/reviews",
            get(reviews::list_reviews).post(reviews::create_review),
        )
        .route("/reviews/for-item", get(reviews::reviews_for_item))
        .route(
            "/reviews/:id",
            get(reviews::get_review)
                .patch(reviews::update_review)
                .delete(reviews::delete_review),
        )
        .route(
            "/reviews/:id/toggle-approval",
            post(reviews::toggle_approval),
        )
        .route(
            "/reviews/:id/replies",
            get(reviews::list_replies).post(reviews::create_reply),
        )
        .route(
            "/reviews/:id/replies/:reply_id",
            patch(reviews::update_reply).delete(reviews::delete_reply),
        )
}

fn analytics_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analytics/sales-summary", get(analytics::sales_summary))
        .route("/analytics/user-activity", get(analytics::user_activity))
        .route(
            "/analytics/recommendations",
            get(analytics::recommendations),
        )
        .route("/analytics/reports", get(analytics::list_reports))
        .route("/analytics/reports/:id", get(analytics::get_report))
}

fn notification_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/unread-count",
            get(notifications::get_unread_count),
        )
        .route("/notifications/mark-read", post(notifications::mark_read))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route(
            "/notifications/:id",
            get(notifications::get_notification).delete(notifications::delete_notification),
        )
        .route(
            "/notifications/:id/read",
            post(notifications::mark_notification_read),
        )
}
