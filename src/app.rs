use async_trait::async_trait;
use axum::{Extension, Router as AxumRouter};
use loco_rs::{
    app::{AppContext, Hooks},
    boot::{create_app, BootResult, StartMode},
    controller::AppRoutes,
    environment::Environment,
    task::Tasks,
    worker::Processor,
    Result,
};
use migration::Migrator;
use sea_orm::DatabaseConnection;

use crate::{config::Settings, controllers, services::factory::SharedServices};

pub struct App;

#[async_trait]
impl Hooks for App {
    fn app_name() -> &'static str {
        env!("CARGO_CRATE_NAME")
    }

    fn app_version() -> String {
        format!(
            "{} ({})",
            env!("CARGO_PKG_VERSION"),
            option_env!("BUILD_SHA")
                .or(option_env!("GITHUB_SHA"))
                .unwrap_or("dev")
        )
    }

    async fn boot(mode: StartMode, environment: &Environment) -> Result<BootResult> {
        create_app::<Self, Migrator>(mode, environment).await
    }

    async fn truncate(db: &DatabaseConnection) -> Result<()> {
        use crate::seeders::DatabaseSeeder;

        DatabaseSeeder::clear_all(db).await?;
        Ok(())
    }

    async fn seed(db: &DatabaseConnection, _base: &std::path::Path) -> Result<()> {
        use crate::seeders::DatabaseSeeder;

        if !DatabaseSeeder::is_seeded(db).await? {
            tracing::info!("Seeding provider catalog...");
            DatabaseSeeder::seed_development(db).await?;
            tracing::info!("Database seeding completed");
        } else {
            tracing::info!("Database already seeded, skipping");
        }

        Ok(())
    }

    fn routes(_ctx: &AppContext) -> AppRoutes {
        AppRoutes::with_default_routes()
            .prefix("/api/v1")
            .add_route(controllers::convert::routes())
            .add_route(controllers::rates::routes())
            .add_route(controllers::health::routes())
            .add_route(controllers::websocket::routes())
    }

    /// Construct the service graph once at startup and hand it to every
    /// handler through an extension layer.
    async fn after_routes(router: AxumRouter, ctx: &AppContext) -> Result<AxumRouter> {
        let settings = Settings::from_env();
        let services = SharedServices::build(ctx.db.clone(), settings).await?;
        Ok(router.layer(Extension(services)))
    }

    fn connect_workers<'a>(_p: &'a mut Processor, _ctx: &'a AppContext) {
        // The rate ingestor runs as its own binary (`rate_ingestor`), not as
        // a queue worker.
    }

    fn register_tasks(_tasks: &mut Tasks) {}
}
