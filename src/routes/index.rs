use axum::response::{Html, IntoResponse};

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Foolish Financial Briefings</title>
<style>
  body { font-family: "Inter", system-ui, -apple-system, sans-serif; background: #121218; color: #fff; margin: 0; padding: 2rem; }
  .card { background: #1e1e24; border-radius: 8px; padding: 1.5rem; max-width: 60rem; margin: 0 auto; box-shadow: 0 4px 8px rgba(0, 0, 0, 0.35); }
  h1 { color: #8a2be2; font-size: 1.5rem; margin-top: 0; }
  button { background: linear-gradient(to right, #8a2be2, #ff1493); color: #fff; border: none; border-radius: 8px; padding: 0.75rem 1.5rem; font-weight: 600; cursor: pointer; }
  button:disabled { opacity: 0.5; cursor: wait; }
  #meta { color: #9e9ea7; margin: 1rem 0; }
  #summary { white-space: pre-wrap; line-height: 1.5; color: #e0e0e6; font-family: inherit; }
  .error { color: #ff6b6b; }
</style>
</head>
<body>
<div class="card">
  <h1>Foolish Financial Briefings - Based on Trending News</h1>
  <button id="go">Get Your Briefs!</button>
  <div id="meta"></div>
  <pre id="summary"></pre>
</div>
<script>
const go = document.getElementById("go");
const meta = document.getElementById("meta");
const out = document.getElementById("summary");
go.addEventListener("click", async () => {
  go.disabled = true;
  meta.className = "";
  meta.textContent = "Working on it... a fresh run can take a few minutes.";
  out.textContent = "";
  try {
    const res = await fetch("/api/briefing", { method: "POST" });
    const body = await res.json();
    if (!res.ok) {
      meta.className = "error";
      meta.textContent = body.error || ("Request failed with status " + res.status);
      return;
    }
    if (body.status === "cached") {
      const hours = Number(body.remaining_hours).toFixed(2);
      meta.textContent = "Showing the briefing from " + body.last_run_local + ". A new one can be generated in " + hours + " hours.";
    } else {
      meta.textContent = "Fresh briefing generated at " + body.last_run_local + ".";
    }
    out.textContent = body.summary;
  } catch (err) {
    meta.className = "error";
    meta.textContent = "Request failed: " + err;
  } finally {
    go.disabled = false;
  }
});
</script>
</body>
</html>
"#;

/// Single page with the briefing button
pub async fn index() -> impl IntoResponse {
    Html(INDEX_HTML)
}
