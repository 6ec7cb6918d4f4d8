use crate::backend::Backend;
use crate::cache::QueryCache;
use crate::export::{citation, csv_filename, to_csv};
use crate::model::{Paper, Session, SessionStatus};
use crate::orchestrator::Searcher;
use crate::projection::{project_now, SortKey, YearWindow};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use warp::{Filter, Reply};

pub type LogBuffer = Arc<Mutex<Vec<String>>>;

pub fn add_log(logs: &LogBuffer, message: &str) {
    let timestamp = Local::now().format("%H:%M:%S");
    let entry = format!("[{}] {}", timestamp, message);

    if let Ok(mut logs) = logs.lock() {
        logs.push(entry.clone());
        if logs.len() > 500 {
            logs.remove(0);
        }
    }

    println!("{}", entry);
}

// The one mutable slot for search state. A new query bumps the generation so
// a superseded in-flight task can recognize itself and discard its effects.
struct SearchSlot {
    generation: u64,
    session: Option<Session>,
}

#[derive(Clone)]
struct AppState {
    slot: Arc<Mutex<SearchSlot>>,
    cache: Arc<Mutex<QueryCache>>,
    searcher: Arc<Searcher>,
    logs: LogBuffer,
}

impl AppState {
    fn new(backend: Backend, stall_timeout: Duration) -> Self {
        let logs: LogBuffer = Arc::new(Mutex::new(Vec::new()));
        Self {
            slot: Arc::new(Mutex::new(SearchSlot {
                generation: 0,
                session: None,
            })),
            cache: Arc::new(Mutex::new(QueryCache::new())),
            searcher: Arc::new(Searcher::with_logger(backend, stall_timeout, logs.clone())),
            logs,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusMessage {
    status: String,
    message: String,
}

impl StatusMessage {
    fn ok(message: &str) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.to_string(),
        }
    }

    fn error(message: &str) -> Self {
        Self {
            status: "error".to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
}

#[derive(Debug, Deserialize)]
struct ResultsQuery {
    #[serde(default)]
    sort: String,
    #[serde(default)]
    years: String,
    #[serde(default)]
    journal: String,
}

#[derive(Debug, Serialize)]
struct SessionView {
    status: String,
    query: String,
    received: usize,
    progress: u32,
    message: String,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct PaperView {
    #[serde(flatten)]
    paper: Paper,
    citation: String,
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    url: String,
    service_type: String,
    #[serde(default)]
    api_key: String,
}

pub async fn start_web_server(port: u16, backend: Backend, stall_timeout: Duration) {
    let state = AppState::new(backend, stall_timeout);
    println!("Web interface running on http://localhost:{}", port);
    warp::serve(routes(state)).run(([127, 0, 0, 1], port)).await;
}

fn routes(
    state: AppState,
) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    let state_filter = warp::any().map(move || state.clone());

    let index = warp::get()
        .and(warp::path::end())
        .map(|| warp::reply::html(index_html()));

    let search = warp::post()
        .and(warp::path!("api" / "search"))
        .and(warp::body::json())
        .and(state_filter.clone())
        .and_then(start_search);

    let session = warp::get()
        .and(warp::path!("api" / "session"))
        .and(state_filter.clone())
        .and_then(get_session);

    let results = warp::get()
        .and(warp::path!("api" / "results"))
        .and(warp::query::<ResultsQuery>())
        .and(state_filter.clone())
        .and_then(get_results);

    let export = warp::get()
        .and(warp::path!("api" / "export"))
        .and(warp::query::<ResultsQuery>())
        .and(state_filter.clone())
        .and_then(export_csv);

    let validate = warp::post()
        .and(warp::path!("api" / "validate"))
        .and(warp::body::json())
        .and_then(validate_service);

    let logs = warp::get()
        .and(warp::path!("api" / "logs"))
        .and(state_filter)
        .map(|state: AppState| {
            let logs = state.logs.lock().unwrap();
            warp::reply::json(&*logs)
        });

    index
        .or(search)
        .or(session)
        .or(results)
        .or(export)
        .or(validate)
        .or(logs)
}

async fn start_search(
    request: SearchRequest,
    state: AppState,
) -> Result<impl Reply, warp::Rejection> {
    let key = QueryCache::normalize(&request.query);
    if key.is_empty() {
        // Validation failures never reach the backend.
        return Ok(warp::reply::json(&StatusMessage::error(
            "Please enter a search topic.",
        )));
    }
    let query = request.query.trim().to_string();

    let cached = state.cache.lock().unwrap().get(&key).cloned();
    if let Some(records) = cached {
        let mut slot = state.slot.lock().unwrap();
        slot.generation += 1;
        add_log(
            &state.logs,
            &format!("Cache hit for \"{}\": {} results", key, records.len()),
        );
        slot.session = Some(Session::completed(key, query, records));
        return Ok(warp::reply::json(&StatusMessage::ok("Served from cache.")));
    }

    let generation = {
        let mut slot = state.slot.lock().unwrap();
        slot.generation += 1;
        slot.session = Some(Session::new(key.clone(), query.clone()));
        slot.generation
    };

    add_log(&state.logs, &format!("Starting search for: {}", query));
    let task_state = state.clone();
    tokio::spawn(async move {
        run_search(task_state, generation, query).await;
    });

    Ok(warp::reply::json(&StatusMessage::ok(
        "Search started in background",
    )))
}

async fn run_search(state: AppState, generation: u64, query: String) {
    let slot = state.slot.clone();
    let result = state
        .searcher
        .search(&query, |paper| {
            let mut slot = slot.lock().unwrap();
            if slot.generation != generation {
                // A newer query owns the slot now; this record is discarded.
                return;
            }
            if let Some(session) = slot.session.as_mut() {
                session.records.push(paper);
            }
        })
        .await;

    let mut slot = state.slot.lock().unwrap();
    if slot.generation != generation {
        add_log(
            &state.logs,
            "A newer search superseded this one; its remaining output was discarded",
        );
        return;
    }
    let Some(session) = slot.session.as_mut() else {
        return;
    };

    match result {
        Ok(summary) => {
            session.status = SessionStatus::Done;
            add_log(
                &state.logs,
                &format!(
                    "Search complete: {} results ({} malformed lines dropped)",
                    summary.received, summary.dropped
                ),
            );
        }
        Err(e) => {
            session.status = SessionStatus::Failed(e.to_string());
            add_log(&state.logs, &format!("Search error: {}", e));
        }
    }

    // A partial set from a failed stream is still worth replaying later.
    if !session.records.is_empty() {
        state
            .cache
            .lock()
            .unwrap()
            .put(session.key.clone(), session.records.clone());
    }
}

async fn get_session(state: AppState) -> Result<impl Reply, warp::Rejection> {
    let slot = state.slot.lock().unwrap();
    let view = match &slot.session {
        None => SessionView {
            status: "idle".to_string(),
            query: String::new(),
            received: 0,
            progress: 0,
            message: "No search yet.".to_string(),
            error: None,
        },
        Some(session) => SessionView {
            status: match session.status {
                SessionStatus::Running => "running",
                SessionStatus::Done => "done",
                SessionStatus::Failed(_) => "failed",
            }
            .to_string(),
            query: session.query.clone(),
            received: session.received(),
            progress: session.progress(),
            message: session.message(),
            error: match &session.status {
                SessionStatus::Failed(reason) => Some(reason.clone()),
                _ => None,
            },
        },
    };
    Ok(warp::reply::json(&view))
}

fn projected(state: &AppState, query: &ResultsQuery) -> (Vec<Paper>, String) {
    let slot = state.slot.lock().unwrap();
    let (records, search_query) = match &slot.session {
        Some(session) => (session.records.clone(), session.query.clone()),
        None => (Vec::new(), String::new()),
    };
    drop(slot);
    let projected = project_now(
        &records,
        YearWindow::parse(&query.years),
        &query.journal,
        SortKey::parse(&query.sort),
    );
    (projected, search_query)
}

async fn get_results(
    query: ResultsQuery,
    state: AppState,
) -> Result<impl Reply, warp::Rejection> {
    let (records, _) = projected(&state, &query);
    let views: Vec<PaperView> = records
        .into_iter()
        .map(|paper| PaperView {
            citation: citation(&paper),
            paper,
        })
        .collect();
    Ok(warp::reply::json(&views))
}

async fn export_csv(
    query: ResultsQuery,
    state: AppState,
) -> Result<impl Reply, warp::Rejection> {
    let (records, search_query) = projected(&state, &query);
    let csv = to_csv(&records);
    let filename = csv_filename(&search_query);
    let reply = warp::reply::with_header(csv, "Content-Type", "text/csv; charset=utf-8");
    let reply = warp::reply::with_header(
        reply,
        "Content-Disposition",
        format!("attachment; filename=\"{}\"", filename),
    );
    Ok(reply)
}

async fn validate_service(request: ValidateRequest) -> Result<impl Reply, warp::Rejection> {
    match request.service_type.as_str() {
        "gemini" => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap();
            let url = format!("{}/v1beta/models", request.url.trim_end_matches('/'));
            match client
                .get(&url)
                .header("x-goog-api-key", request.api_key.trim())
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => Ok(warp::reply::json(
                    &StatusMessage::ok("Gemini API is reachable"),
                )),
                Ok(response) => Ok(warp::reply::json(&StatusMessage::error(&format!(
                    "Gemini returned status: {}",
                    response.status()
                )))),
                Err(e) => Ok(warp::reply::json(&StatusMessage::error(&format!(
                    "Cannot reach Gemini: {}",
                    e
                )))),
            }
        }
        "ollama" => {
            let ollama = match ollama_rs::Ollama::try_new(request.url.clone()) {
                Ok(ollama) => ollama,
                Err(e) => {
                    return Ok(warp::reply::json(&StatusMessage::error(&format!(
                        "Invalid Ollama URL: {}",
                        e
                    ))))
                }
            };
            match ollama.list_local_models().await {
                Ok(models) => {
                    let names: Vec<String> = models.into_iter().map(|m| m.name).collect();
                    Ok(warp::reply::json(&serde_json::json!({
                        "status": "ok",
                        "message": "Ollama is reachable",
                        "models": names,
                    })))
                }
                Err(e) => Ok(warp::reply::json(&StatusMessage::error(&format!(
                    "Cannot reach Ollama: {}",
                    e
                )))),
            }
        }
        _ => Ok(warp::reply::json(&StatusMessage::error(
            "Invalid service type",
        ))),
    }
}

fn index_html() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>ScholarStream</title>
    <style>
        body { font-family: Arial; margin: 20px; background: #f5f5f5; min-height: 100vh; display: flex; flex-direction: column; }
        .content { flex: 1; max-width: 960px; margin: 0 auto; width: 100%; }
        h1 { color: #333; }

        .status-message { padding: 10px; margin: 10px 0; border-radius: 0; display: none; }
        .status-message.success { background: #d4edda; color: #155724; border: 1px solid #c3e6cb; }
        .status-message.error { background: #f8d7da; color: #721c24; border: 1px solid #f5c6cb; }

        .search-bar { margin: 20px 0; display: flex; gap: 8px; }
        .search-bar input { flex: 1; padding: 10px; border: 1px solid #ccc; }

        button { padding: 8px 16px; background: rgb(100, 149, 237); color: white; border: none; cursor: pointer; border-radius: 0; }
        button:hover { background: #5a8dd4; }
        button:disabled { background: #aaa; cursor: not-allowed; }
        button.secondary { background: #6c757d; }
        button.secondary:hover { background: #5a6268; }
        button.copy { background: #e9ecef; color: #333; font-size: 12px; padding: 4px 10px; }
        button.copy:hover { background: #d6d9dc; }
        button.copy.copied { background: #28a745; color: white; }

        .progress-wrap { display: none; margin: 10px 0; }
        .progress-wrap.active { display: block; }
        .progress-track { background: #e0e0e0; height: 22px; }
        .progress-fill { background: rgb(100, 149, 237); color: white; height: 22px; width: 0%; font-size: 12px; line-height: 22px; text-align: center; transition: width 0.3s ease; }
        .progress-message { color: #666; font-size: 14px; margin-top: 6px; }

        .controls { background: white; border: 1px solid #ddd; padding: 12px; margin: 10px 0; display: none; grid-template-columns: 1fr 1fr 1fr auto; gap: 12px; align-items: end; }
        .controls.active { display: grid; }
        .controls label { display: block; font-size: 13px; font-weight: bold; margin-bottom: 4px; color: #555; }
        .controls select, .controls input { width: 100%; box-sizing: border-box; padding: 6px; }

        .result { background: white; padding: 15px; margin: 10px 0; border: 1px solid #ddd; border-radius: 0; }
        .result h3 { margin: 0 0 8px 0; }
        .result a { color: #007bff; text-decoration: none; }
        .result a:hover { text-decoration: underline; }

        .meta { color: #666; font-size: 14px; margin-bottom: 8px; }
        .meta span { margin-right: 14px; }
        .score { font-weight: bold; color: rgb(0, 150, 255); }
        .pill { display: inline-block; padding: 3px 8px; border-radius: 0; font-size: 12px; font-weight: bold; }
        .pill.high { background: #d4edda; color: #155724; }
        .pill.mid { background: #fff3cd; color: #856404; }
        .pill.low { background: #ffe5d0; color: #8a4b08; }

        .reasoning { margin-top: 8px; padding: 10px; background: #f9f9f9; border-left: 3px solid #007bff; font-size: 14px; font-style: italic; }
        .pdf-note { color: #856404; font-size: 13px; margin-top: 8px; }

        .tabs { margin: 20px 0 0 0; border-bottom: 2px solid #ddd; }
        .tab { display: inline-block; padding: 10px 20px; cursor: pointer; background: #e9ecef; margin-right: 5px; border-radius: 0; }
        .tab.active { background: white; border: 1px solid #ddd; border-bottom: none; }
        .tab-content { display: none; }
        .tab-content.active { display: block; }

        .log-container { background: #1e1e1e; color: #d4d4d4; padding: 15px; border-radius: 0; max-height: 500px; overflow-y: auto; font-family: 'Courier New', monospace; font-size: 13px; margin-top: 15px; }
        .log-entry { margin: 3px 0; }

        .empty { text-align: center; color: #888; padding: 40px 0; }

        footer { margin-top: 40px; padding: 20px; text-align: center; color: black; }
    </style>
</head>
<body>
    <div class="content">
        <h1>ScholarStream</h1>
        <p>Search for research papers; results stream in as they are found and can be sorted, filtered and exported.</p>

        <div id="status-message" class="status-message"></div>

        <div class="search-bar">
            <input type="text" id="query" placeholder="e.g. quantum computing applications"
                   onkeydown="if (event.key === 'Enter') startSearch()">
            <button id="search-button" onclick="startSearch()">Search</button>
        </div>

        <div id="progress" class="progress-wrap">
            <div class="progress-track"><div id="progress-fill" class="progress-fill">0%</div></div>
            <div id="progress-message" class="progress-message"></div>
        </div>

        <div class="tabs">
            <div class="tab active" onclick="showTab(event, 'results')">Results</div>
            <div class="tab" onclick="showTab(event, 'logs')">Logs</div>
        </div>

        <div id="results-tab" class="tab-content active">
            <div id="controls" class="controls">
                <div>
                    <label>Sort by</label>
                    <select id="sort" onchange="refreshResults()">
                        <option value="relevance_desc">Relevance (highest)</option>
                        <option value="year_desc">Year (newest)</option>
                        <option value="year_asc">Year (oldest)</option>
                        <option value="citations_desc">Citations (most)</option>
                    </select>
                </div>
                <div>
                    <label>Publication year</label>
                    <select id="years" onchange="refreshResults()">
                        <option value="all">All time</option>
                        <option value="5">Last 5 years</option>
                        <option value="10">Last 10 years</option>
                    </select>
                </div>
                <div>
                    <label>Journal</label>
                    <input type="text" id="journal" placeholder="Journal name..." oninput="refreshResults()">
                </div>
                <button class="secondary" onclick="downloadCsv()">Download CSV</button>
            </div>
            <div id="results"><div class="empty">Results will appear here once you start a search.</div></div>
        </div>

        <div id="logs-tab" class="tab-content">
            <h2>Technical Logs</h2>
            <button onclick="loadLogs()">Refresh Logs</button>
            <div class="log-container" id="log-container"></div>
        </div>
    </div>

    <footer>
        <p>ScholarStream</p>
    </footer>

    <script>
        let pollTimer = null;
        let logTimer = null;

        function esc(value) {
            const div = document.createElement('div');
            div.textContent = value === undefined || value === null ? '' : String(value);
            return div.innerHTML;
        }

        function showStatusMessage(message, isSuccess) {
            const element = document.getElementById('status-message');
            element.textContent = message;
            element.className = 'status-message ' + (isSuccess ? 'success' : 'error');
            element.style.display = 'block';
            setTimeout(() => { element.style.display = 'none'; }, 5000);
        }

        function showTab(e, tabId) {
            document.querySelectorAll('.tab').forEach(t => t.classList.remove('active'));
            document.querySelectorAll('.tab-content').forEach(c => c.classList.remove('active'));
            e.target.classList.add('active');
            document.getElementById(tabId + '-tab').classList.add('active');
            if (tabId === 'logs') {
                loadLogs();
                logTimer = setInterval(loadLogs, 2000);
            } else if (logTimer) {
                clearInterval(logTimer);
                logTimer = null;
            }
        }

        function filterParams() {
            return 'sort=' + encodeURIComponent(document.getElementById('sort').value)
                + '&years=' + encodeURIComponent(document.getElementById('years').value)
                + '&journal=' + encodeURIComponent(document.getElementById('journal').value);
        }

        function startSearch() {
            const query = document.getElementById('query').value;
            document.getElementById('sort').value = 'relevance_desc';
            document.getElementById('years').value = 'all';
            document.getElementById('journal').value = '';

            fetch('/api/search', {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({ query: query })
            })
            .then(r => r.json())
            .then(data => {
                if (data.status !== 'ok') {
                    showStatusMessage(data.message, false);
                    return;
                }
                document.getElementById('search-button').disabled = true;
                document.getElementById('progress').classList.add('active');
                if (pollTimer) clearInterval(pollTimer);
                pollTimer = setInterval(pollSession, 700);
                pollSession();
            })
            .catch(err => showStatusMessage('Something went wrong: ' + err, false));
        }

        function pollSession() {
            fetch('/api/session')
                .then(r => r.json())
                .then(session => {
                    document.getElementById('progress-fill').style.width = session.progress + '%';
                    document.getElementById('progress-fill').textContent = session.progress + '%';
                    document.getElementById('progress-message').textContent = session.message;
                    refreshResults();
                    if (session.status !== 'running') {
                        clearInterval(pollTimer);
                        pollTimer = null;
                        document.getElementById('search-button').disabled = false;
                        document.getElementById('progress').classList.remove('active');
                        if (session.status === 'failed') {
                            showStatusMessage('Could not retrieve papers: ' + (session.error || 'unknown error'), false);
                        }
                    }
                });
        }

        function tagClass(tag) {
            if (tag === 'Highly Relevant') return 'high';
            if (tag === 'Relevant') return 'mid';
            return 'low';
        }

        function renderCard(paper) {
            const authors = paper.authors && paper.authors.length ? paper.authors.join(', ') : 'Unknown authors';
            const journal = paper.sourceJournal || 'Unknown source';
            const citations = paper.citations !== undefined && paper.citations !== null
                ? '<span>' + esc(paper.citations) + ' citations</span>' : '';
            const pdfNote = paper.pdfAvailable ? '' :
                '<div class="pdf-note">This source may not offer a direct PDF download.</div>';
            return '<div class="result">'
                + '<h3><a href="' + esc(paper.url) + '" target="_blank" rel="noopener">' + esc(paper.title) + '</a></h3>'
                + '<div class="meta">'
                + '<span>' + esc(authors) + '</span>'
                + '<span>' + esc(paper.year || 'n.d.') + '</span>'
                + citations
                + '<span>' + esc(journal) + '</span>'
                + '</div>'
                + '<div>'
                + '<span class="score">Score: ' + esc(paper.relevanceScore) + '/100</span> '
                + '<span class="pill ' + tagClass(paper.relevanceTag) + '">' + esc(paper.relevanceTag) + '</span>'
                + '</div>'
                + '<div class="reasoning">' + esc(paper.reasoning) + '</div>'
                + '<div style="margin-top:10px;">'
                + '<button class="copy" onclick="copyCitation(this)" data-citation="' + esc(paper.citation) + '">Copy citation</button>'
                + '</div>'
                + pdfNote
                + '</div>';
        }

        function refreshResults() {
            fetch('/api/results?' + filterParams())
                .then(r => r.json())
                .then(papers => {
                    const container = document.getElementById('results');
                    document.getElementById('controls').classList.toggle('active', papers.length > 0);
                    if (papers.length === 0) {
                        container.innerHTML = '<div class="empty">No results. Try another query or loosen the filters.</div>';
                        return;
                    }
                    container.innerHTML = papers.map(renderCard).join('');
                });
        }

        function copyCitation(button) {
            navigator.clipboard.writeText(button.dataset.citation).then(() => {
                button.classList.add('copied');
                button.textContent = 'Copied!';
                setTimeout(() => {
                    button.classList.remove('copied');
                    button.textContent = 'Copy citation';
                }, 2000);
            });
        }

        function downloadCsv() {
            window.location = '/api/export?' + filterParams();
        }

        function loadLogs() {
            fetch('/api/logs')
                .then(r => r.json())
                .then(logs => {
                    const container = document.getElementById('log-container');
                    container.innerHTML = '';
                    if (logs.length === 0) {
                        container.innerHTML = '<div class="log-entry">No logs yet. Start a search to see activity.</div>';
                        return;
                    }
                    logs.forEach(log => {
                        const div = document.createElement('div');
                        div.className = 'log-entry';
                        div.textContent = log;
                        container.appendChild(div);
                    });
                    container.scrollTop = container.scrollHeight;
                });
        }

        refreshResults();
    </script>
</body>
</html>"#
        .to_string()
}
