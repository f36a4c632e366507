#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CreateRunRequest {
    Config(GraftConfig),
    WithOptions(CreateRunOptions),
}

#[derive(Debug, Deserialize)]
struct CreateRunOptions {
    config: GraftConfig,
    sqlite_path: Option<String>,
    replace_existing: Option<bool>,
}

#[derive(Debug, Serialize)]
struct CreateRunResponse {
    schema_version: String,
    run_id: String,
    status: GraftStatus,
    replaced_existing_run: bool,
}

#[derive(Debug, Deserialize)]
struct ListRunsQuery {
    page_size: Option<usize>,
    sqlite_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListRunsResponse {
    schema_version: String,
    active_run_id: Option<String>,
    runs: Vec<PersistedRunSummary>,
}

async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<ListRunsResponse>, HttpApiError> {
    let page_size = query.page_size.unwrap_or(200).max(1).min(MAX_PAGE_SIZE);

    let sqlite_path = query
        .sqlite_path
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path);

    let active_run_id = {
        let inner = state.inner.lock().await;
        inner
            .engine
            .as_ref()
            .map(|engine| engine.run_id().to_string())
    };

    let store = crate::persistence::SqliteAuditStore::open(sqlite_path)
        .map_err(HttpApiError::from_persistence)?;
    let runs = store
        .list_runs(page_size)
        .map_err(HttpApiError::from_persistence)?;

    Ok(Json(ListRunsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        active_run_id,
        runs,
    }))
}

async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<CreateRunRequest>,
) -> Result<Json<CreateRunResponse>, HttpApiError> {
    let (config, sqlite_path, replace_existing) = match request {
        CreateRunRequest::Config(config) => (config, default_sqlite_path(), true),
        CreateRunRequest::WithOptions(options) => (
            options.config,
            options
                .sqlite_path
                .filter(|path| !path.trim().is_empty())
                .unwrap_or_else(default_sqlite_path),
            options.replace_existing.unwrap_or(true),
        ),
    };

    let mut inner = state.inner.lock().await;
    let replaced_existing_run = inner.engine.is_some();

    let mut engine = GraftApi::from_config(config);
    engine
        .attach_sqlite_store(sqlite_path)
        .map_err(HttpApiError::from_persistence)?;
    engine
        .initialize_run_storage(replace_existing)
        .map_err(HttpApiError::from_persistence)?;

    let status = engine.status();
    inner.engine = Some(engine);

    Ok(Json(CreateRunResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        run_id: status.run_id.clone(),
        status,
        replaced_existing_run,
    }))
}

#[derive(Debug, Deserialize)]
struct StepRequest {
    steps: Option<u64>,
}

#[derive(Debug, Serialize)]
struct StepResponse {
    schema_version: String,
    run_id: String,
    status: GraftStatus,
    committed: u64,
}

async fn step_run(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<StepRequest>,
) -> Result<Json<StepResponse>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let engine = require_run_mut(&mut inner, &run_id)?;

    let (status, committed) = engine.step_ticks(request.steps.unwrap_or(1));

    Ok(Json(StepResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        run_id: status.run_id.clone(),
        status,
        committed,
    }))
}

#[derive(Debug, Deserialize)]
struct DrawRequest {
    max_attempts: Option<u32>,
}

#[derive(Debug, Serialize)]
struct DrawResponse {
    schema_version: String,
    run_id: String,
    result: CommandResult,
    household: Option<Household>,
}

async fn draw_household(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<DrawRequest>,
) -> Result<Json<DrawResponse>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let engine = require_run_mut(&mut inner, &run_id)?;

    let (result, household) = engine.draw_household(request.max_attempts);

    Ok(Json(DrawResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        run_id,
        result,
        household,
    }))
}

#[derive(Debug, Deserialize)]
struct ReleaseRequest {
    resident_id: ResidentId,
}

#[derive(Debug, Serialize)]
struct ReleaseResponse {
    schema_version: String,
    run_id: String,
    result: CommandResult,
    was_reserved: bool,
}

async fn release_resident(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ReleaseRequest>,
) -> Result<Json<ReleaseResponse>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let engine = require_run_mut(&mut inner, &run_id)?;

    let (result, was_reserved) = engine.release_resident(request.resident_id);

    Ok(Json(ReleaseResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        run_id,
        result,
        was_reserved,
    }))
}
