use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    nest( (path = "/api", api = super::HelmHubApi) ),
    tags( (name = "Helm Hub API", description = "Live helmet telemetry and device configuration") )
)]
pub struct HelmHubDoc;
