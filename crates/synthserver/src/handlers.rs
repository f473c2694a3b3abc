use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use synthcore::{OutputMap, StoreError, WorkflowDefinition, WorkflowError, WorkflowId, WorkflowPatch};
use synthruntime::{ExecutionStream, SynthRuntime};
use tracing::{error, info};
use uuid::Uuid;

/// Application state shared across handlers
pub struct AppState {
    pub runtime: Arc<SynthRuntime>,
}

/// Ad-hoc execution of a definition that need not be stored
#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    workflow: WorkflowDefinition,
    #[serde(default)]
    seed: OutputMap,
    #[serde(default)]
    workflow_id: Option<WorkflowId>,
}

#[derive(Debug, Default, Deserialize)]
struct SeedRequest {
    #[serde(default)]
    seed: OutputMap,
}

#[derive(Debug, Deserialize)]
struct CreateWorkflowRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    data: WorkflowDefinition,
}

#[derive(Debug, Deserialize)]
struct UpdateWorkflowRequest {
    expected_version: u64,
    #[serde(flatten)]
    patch: WorkflowPatch,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    page: usize,
    #[serde(default = "default_page_size")]
    size: usize,
}

fn default_page_size() -> usize {
    20
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(mut builder: actix_web::HttpResponseBuilder, error: impl ToString) -> HttpResponse {
    builder.json(ErrorResponse {
        error: error.to_string(),
    })
}

fn store_error(e: StoreError) -> HttpResponse {
    match e {
        StoreError::NotFound(_) => error_response(HttpResponse::NotFound(), e),
        StoreError::Conflict { .. } | StoreError::DuplicateName(_) => error_response(HttpResponse::Conflict(), e),
    }
}

fn invalid_workflow(e: WorkflowError) -> HttpResponse {
    error_response(HttpResponse::BadRequest(), e)
}

/// Newline-delimited JSON body fed by the run's progress queue
fn ndjson(stream: ExecutionStream) -> HttpResponse {
    let body = stream
        .into_messages()
        .map(|message| Ok::<_, Infallible>(web::Bytes::from(message.to_line())));
    HttpResponse::Ok().content_type("application/x-ndjson").streaming(body)
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "synthserver"
    }))
}

/// List available node types
#[get("/api/nodes")]
async fn list_node_types(data: web::Data<AppState>) -> impl Responder {
    let registry = data.runtime.registry();
    let nodes: Vec<_> = registry
        .list_node_types()
        .iter()
        .map(|node_type| {
            let metadata = registry.get_metadata(node_type).unwrap_or_default();
            serde_json::json!({
                "type": node_type,
                "description": metadata.description,
                "category": metadata.category,
            })
        })
        .collect();

    HttpResponse::Ok().json(nodes)
}

#[post("/api/execute")]
async fn execute(data: web::Data<AppState>, req: web::Json<ExecuteRequest>) -> impl Responder {
    let req = req.into_inner();
    info!(nodes = req.workflow.nodes.len(), "Executing ad-hoc workflow");

    let result = data.runtime.execute(req.workflow_id, &req.workflow, req.seed).await;
    HttpResponse::Ok().json(result)
}

#[post("/api/execute/stream")]
async fn execute_stream(data: web::Data<AppState>, req: web::Json<ExecuteRequest>) -> impl Responder {
    let req = req.into_inner();
    info!(nodes = req.workflow.nodes.len(), "Streaming ad-hoc workflow");

    ndjson(data.runtime.spawn_streaming(req.workflow_id, req.workflow, req.seed))
}

#[get("/api/workflows")]
async fn list_workflows(data: web::Data<AppState>, query: web::Query<ListQuery>) -> impl Responder {
    match data.runtime.store().list(query.page, query.size.max(1)).await {
        Ok((items, total)) => HttpResponse::Ok().json(serde_json::json!({
            "items": items,
            "total": total,
            "page": query.page,
            "size": query.size,
        })),
        Err(e) => store_error(e),
    }
}

#[post("/api/workflows")]
async fn create_workflow(data: web::Data<AppState>, req: web::Json<CreateWorkflowRequest>) -> impl Responder {
    let req = req.into_inner();
    if let Err(e) = req.data.validate(data.runtime.config().strict_connections) {
        return invalid_workflow(e);
    }

    match data.runtime.store().create(req.name, req.description, req.data).await {
        Ok(stored) => {
            info!("Created workflow: {} ({})", stored.name, stored.id);
            HttpResponse::Created().json(stored)
        }
        Err(e) => store_error(e),
    }
}

#[get("/api/workflows/{id}")]
async fn get_workflow(data: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    match data.runtime.store().get(path.into_inner()).await {
        Ok(stored) => HttpResponse::Ok().json(stored),
        Err(e) => store_error(e),
    }
}

#[put("/api/workflows/{id}")]
async fn update_workflow(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<UpdateWorkflowRequest>,
) -> impl Responder {
    let workflow_id = path.into_inner();
    let req = req.into_inner();
    if let Some(definition) = &req.patch.data {
        if let Err(e) = definition.validate(data.runtime.config().strict_connections) {
            return invalid_workflow(e);
        }
    }

    match data.runtime.store().update(workflow_id, req.patch, req.expected_version).await {
        Ok(stored) => {
            info!(version = stored.version, "Updated workflow: {}", workflow_id);
            HttpResponse::Ok().json(stored)
        }
        Err(e) => store_error(e),
    }
}

#[delete("/api/workflows/{id}")]
async fn delete_workflow(data: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    let workflow_id = path.into_inner();
    match data.runtime.store().delete(workflow_id).await {
        Ok(()) => {
            info!("Deleted workflow: {}", workflow_id);
            HttpResponse::NoContent().finish()
        }
        Err(e) => store_error(e),
    }
}

#[post("/api/workflows/{id}/execute")]
async fn execute_workflow(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: Option<web::Json<SeedRequest>>,
) -> impl Responder {
    let workflow_id = path.into_inner();
    let seed = req.map(|r| r.into_inner().seed).unwrap_or_default();

    info!("Executing workflow: {}", workflow_id);
    match data.runtime.execute_stored(workflow_id, seed).await {
        Ok(result) => {
            info!(status = ?result.status, "Workflow {} finished", workflow_id);
            HttpResponse::Ok().json(result)
        }
        Err(synthcore::SynthError::Store(e)) => store_error(e),
        Err(e) => {
            error!("Workflow {} execution failed: {}", workflow_id, e);
            error_response(HttpResponse::InternalServerError(), e)
        }
    }
}

#[post("/api/workflows/{id}/execute/stream")]
async fn execute_workflow_stream(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: Option<web::Json<SeedRequest>>,
) -> impl Responder {
    let workflow_id = path.into_inner();
    let seed = req.map(|r| r.into_inner().seed).unwrap_or_default();

    match data.runtime.store().get(workflow_id).await {
        Ok(stored) => {
            info!("Streaming workflow: {}", workflow_id);
            ndjson(data.runtime.spawn_streaming(Some(stored.id), stored.data, seed))
        }
        Err(e) => store_error(e),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(list_node_types)
        .service(execute)
        .service(execute_stream)
        .service(list_workflows)
        .service(create_workflow)
        .service(get_workflow)
        .service(update_workflow)
        .service(delete_workflow)
        .service(execute_workflow)
        .service(execute_workflow_stream);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use synthcore::{GenerationError, GenerationParameters, GenerationRequest, GenerationResponse, GenerationService};
    use synthnodes::NodeServices;
    use synthruntime::{MemoryTemplateStore, RuntimeConfig};

    struct Unreachable;

    #[async_trait]
    impl GenerationService for Unreachable {
        async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, GenerationError> {
            Err(GenerationError::Connection("offline".to_string()))
        }
    }

    fn state() -> web::Data<AppState> {
        let services = NodeServices::new(
            Arc::new(Unreachable),
            Arc::new(MemoryTemplateStore::new()),
            GenerationParameters::default(),
        );
        let registry = synthnodes::standard_registry(&services);
        let runtime = SynthRuntime::with_registry(Arc::new(registry), RuntimeConfig::default());
        web::Data::new(AppState {
            runtime: Arc::new(runtime),
        })
    }

    fn greeting() -> Value {
        json!({
            "nodes": {
                "txt": {"type": "text", "name": "Greeting", "text_content": "hello"},
                "out": {"type": "output", "name": "Result"}
            },
            "connections": [{"source_node_id": "txt", "target_node_id": "out"}]
        })
    }

    #[actix_web::test]
    async fn test_health() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_execute_ad_hoc_workflow() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/execute")
            .set_json(json!({"workflow": greeting()}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], json!("success"));
        assert_eq!(body["final_output"]["output"], json!("hello"));
    }

    #[actix_web::test]
    async fn test_stream_is_ndjson() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/execute/stream")
            .set_json(json!({"workflow": greeting()}))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;

        let lines: Vec<Value> = std::str::from_utf8(&body)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.first().unwrap()["type"], json!("init"));
        assert_eq!(lines.last().unwrap()["type"], json!("complete"));
        assert_eq!(lines.len(), 1 + 2 + 2 * 5 + 1);
    }

    #[actix_web::test]
    async fn test_update_with_stale_version_conflicts() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/workflows")
            .set_json(json!({"name": "greeting", "data": greeting()}))
            .to_request();
        let created: Value = test::call_and_read_body_json(&app, req).await;
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["version"], json!(1));

        let update = |version: u64| {
            test::TestRequest::put()
                .uri(&format!("/api/workflows/{}", id))
                .set_json(json!({"expected_version": version, "description": "v2"}))
                .to_request()
        };
        let ok = test::call_service(&app, update(1)).await;
        assert_eq!(ok.status(), StatusCode::OK);
        let stale = test::call_service(&app, update(1)).await;
        assert_eq!(stale.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::post()
            .uri(&format!("/api/workflows/{}/execute", id))
            .set_json(json!({"seed": {}}))
            .to_request();
        let result: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(result["workflow_id"], json!(id));
    }

    #[actix_web::test]
    async fn test_missing_workflow_is_404() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let uri = format!("/api/workflows/{}", Uuid::new_v4());
        let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
