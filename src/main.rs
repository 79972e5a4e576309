use lambda_http::{run, service_fn, Error, Request};
use privalink::handler::{self, Ctx};

#[tokio::main]
async fn main() -> Result<(), Error> {
    privalink::init_tracing();

    let ctx = Ctx::from_env().await?;

    run(service_fn(move |req: Request| {
        let ctx = ctx.clone();
        async move { handler::router(req, &ctx).await }
    }))
    .await
}
