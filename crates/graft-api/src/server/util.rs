fn apply_cors_headers(headers: &mut axum::http::HeaderMap) {
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET,POST,OPTIONS,PUT,PATCH,DELETE"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-max-age"),
        HeaderValue::from_static("3600"),
    );
}

fn default_sqlite_path() -> String {
    std::env::var("GRAFT_SQLITE_PATH")
        .ok()
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SQLITE_PATH.to_string())
}

fn paginate(
    total: usize,
    cursor: Option<usize>,
    page_size: Option<usize>,
) -> Result<(usize, usize, Option<usize>), HttpApiError> {
    let start = cursor.unwrap_or(0);
    if start > total {
        return Err(HttpApiError::invalid_query(
            "cursor is out of bounds",
            Some(format!("cursor={start} total={total}")),
        ));
    }

    let size = page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .max(1)
        .min(MAX_PAGE_SIZE);
    let end = start.saturating_add(size).min(total);
    let next_cursor = if end < total { Some(end) } else { None };

    Ok((start, end, next_cursor))
}

fn parse_event_type_filter(
    requested_types: &[String],
) -> Result<Option<HashSet<EventType>>, HttpApiError> {
    if requested_types.is_empty() {
        return Ok(None);
    }

    let mut filter = HashSet::new();

    for value in requested_types {
        let normalized = value.trim().to_lowercase();
        let event_type = match normalized.as_str() {
            "loading_completed_before_arm" => EventType::LoadingCompletedBeforeArm,
            "bootstrap_armed" => EventType::BootstrapArmed,
            "template_located" => EventType::TemplateLocated,
            "template_fallback_used" => EventType::TemplateFallbackUsed,
            "baseline_refreshed" => EventType::BaselineRefreshed,
            "services_panel_replaced" => EventType::ServicesPanelReplaced,
            "annex_tab_created" => EventType::AnnexTabCreated,
            "annex_panel_attached" => EventType::AnnexPanelAttached,
            "tab_count_mismatch" => EventType::TabCountMismatch,
            "legacy_children_draining" => EventType::LegacyChildrenDraining,
            "menu_graft_completed" => EventType::MenuGraftCompleted,
            "custom_refresh_faulted" => EventType::CustomRefreshFaulted,
            "pool_refreshed" => EventType::PoolRefreshed,
            "pool_refresh_skipped" => EventType::PoolRefreshSkipped,
            "household_drawn" => EventType::HouseholdDrawn,
            "draw_exhausted" => EventType::DrawExhausted,
            "resident_released" => EventType::ResidentReleased,
            _ => {
                return Err(HttpApiError::invalid_query(
                    "invalid event type filter",
                    Some(format!("event_type={value}")),
                ))
            }
        };

        filter.insert(event_type);
    }

    Ok(Some(filter))
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
