async fn get_status(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<GraftStatus>, HttpApiError> {
    let inner = state.inner.lock().await;
    let engine = require_run(&inner, &run_id)?;
    Ok(Json(engine.status()))
}

async fn get_migration(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<QueryResponse>, HttpApiError> {
    let inner = state.inner.lock().await;
    let engine = require_run(&inner, &run_id)?;

    let data = serde_json::to_value(engine.migration_report())
        .map_err(|err| HttpApiError::internal("failed to serialize report", Some(err.to_string())))?;

    Ok(Json(QueryResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        query_type: "migration_report".to_string(),
        run_id,
        generated_at_tick: engine.status().current_tick,
        data,
    }))
}

async fn get_pool(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<QueryResponse>, HttpApiError> {
    let inner = state.inner.lock().await;
    let engine = require_run(&inner, &run_id)?;

    let data = serde_json::to_value(engine.pool_report())
        .map_err(|err| HttpApiError::internal("failed to serialize report", Some(err.to_string())))?;

    Ok(Json(QueryResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        query_type: "pool_report".to_string(),
        run_id,
        generated_at_tick: engine.status().current_tick,
        data,
    }))
}

#[derive(Debug, Deserialize)]
struct TimelineQuery {
    cursor: Option<usize>,
    page_size: Option<usize>,
    event_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct TimelineResponse {
    schema_version: String,
    run_id: String,
    total: usize,
    next_cursor: Option<usize>,
    events: Vec<Event>,
}

async fn get_timeline(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<TimelineResponse>, HttpApiError> {
    let requested_types = query
        .event_type
        .map(|raw| {
            raw.split(',')
                .map(str::to_string)
                .filter(|value| !value.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let filter = parse_event_type_filter(&requested_types)?;

    let inner = state.inner.lock().await;
    let engine = require_run(&inner, &run_id)?;

    let filtered = engine
        .events()
        .iter()
        .filter(|event| {
            filter
                .as_ref()
                .map(|wanted| wanted.contains(&event.event_type))
                .unwrap_or(true)
        })
        .cloned()
        .collect::<Vec<_>>();

    let (start, end, next_cursor) = paginate(filtered.len(), query.cursor, query.page_size)?;

    Ok(Json(TimelineResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        run_id,
        total: filtered.len(),
        next_cursor,
        events: filtered[start..end].to_vec(),
    }))
}
