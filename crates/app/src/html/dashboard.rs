//! Operator dashboard: live feed, stream controls, stats tiles, and the
//! rolling event log, all driven by the `/api/*` endpoints.

pub(crate) static DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Watchpost</title>
<style>
  body { margin: 0; font-family: system-ui, sans-serif; background: #101418; color: #dde3ea; }
  header { display: flex; align-items: center; gap: 1rem; padding: 0.8rem 1.2rem; background: #161c23; }
  header h1 { font-size: 1.1rem; margin: 0; letter-spacing: 0.08em; text-transform: uppercase; }
  #badges span { margin-left: 0.6rem; padding: 0.15rem 0.6rem; border-radius: 0.8rem; font-size: 0.75rem; background: #2a323c; }
  #badges span.on { background: #1d5c32; }
  main { display: grid; grid-template-columns: 2fr 1fr; gap: 1rem; padding: 1rem 1.2rem; }
  .panel { background: #161c23; border-radius: 0.5rem; padding: 1rem; }
  #feed { width: 100%; background: #000; border-radius: 0.3rem; min-height: 240px; }
  button { border: 0; border-radius: 0.3rem; padding: 0.5rem 1.2rem; margin-right: 0.5rem; cursor: pointer; font-weight: 600; }
  #start { background: #1d5c32; color: #dff5e4; }
  #stop { background: #6b2424; color: #fbe2e2; }
  .tiles { display: grid; grid-template-columns: repeat(2, 1fr); gap: 0.6rem; margin-top: 0.6rem; }
  .tile { background: #1d242d; border-radius: 0.4rem; padding: 0.6rem; }
  .tile .value { font-size: 1.4rem; font-weight: 700; }
  .tile .label { font-size: 0.7rem; text-transform: uppercase; color: #8b96a3; }
  #threat.High { color: #ff6d6d; }
  #threat.Medium { color: #ffc46d; }
  #threat.Low { color: #7fd98c; }
  table { width: 100%; border-collapse: collapse; font-size: 0.8rem; margin-top: 0.6rem; }
  th, td { text-align: left; padding: 0.3rem 0.4rem; border-bottom: 1px solid #222b35; }
  td.sent { color: #7fd98c; }
</style>
</head>
<body>
<header>
  <h1>Watchpost</h1>
  <div id="badges">
    <span id="stream-badge">stream</span>
    <span id="model-badge">model</span>
    <span id="camera-badge">camera</span>
  </div>
</header>
<main>
  <section class="panel">
    <img id="feed" alt="live feed">
    <div style="margin-top:0.8rem">
      <button id="start">Start stream</button>
      <button id="stop">Stop stream</button>
    </div>
  </section>
  <section class="panel">
    <div class="tiles">
      <div class="tile"><div class="value" id="total">0</div><div class="label">Total detections</div></div>
      <div class="tile"><div class="value" id="current">0</div><div class="label">Current frame</div></div>
      <div class="tile"><div class="value" id="threat">Low</div><div class="label">Threat level</div></div>
      <div class="tile"><div class="value" id="uptime">0.00</div><div class="label">Uptime (h)</div></div>
    </div>
    <table>
      <thead><tr><th>#</th><th>Time</th><th>Object</th><th>Conf</th><th>Severity</th><th>Alert</th></tr></thead>
      <tbody id="log"></tbody>
    </table>
  </section>
</main>
<script>
const badge = (id, on) => document.getElementById(id).classList.toggle('on', on);

async function refreshStatus() {
  const status = await fetch('/api/status').then(r => r.json());
  badge('stream-badge', status.is_streaming);
  badge('model-badge', status.model_loaded);
  badge('camera-badge', status.camera_active);
  const feed = document.getElementById('feed');
  if (status.is_streaming && !feed.src) {
    feed.src = '/api/video_feed';
  } else if (!status.is_streaming && feed.src) {
    feed.removeAttribute('src');
  }
}

async function refreshStats() {
  const stats = await fetch('/api/stats').then(r => r.json());
  document.getElementById('total').textContent = stats.total_detections;
  document.getElementById('current').textContent = stats.current_detections;
  document.getElementById('uptime').textContent = stats.uptime_hours.toFixed(2);
  const threat = document.getElementById('threat');
  threat.textContent = stats.threat_level;
  threat.className = stats.threat_level;
}

async function refreshLogs() {
  const data = await fetch('/api/logs?order=desc').then(r => r.json());
  const rows = data.logs.slice(0, 15).map(e =>
    `<tr><td>${e.id}</td><td>${e.timestamp.slice(11, 19)}</td><td>${e.object}</td>` +
    `<td>${e.confidence.toFixed(2)}</td><td>${e.status}</td>` +
    `<td class="${e.email_sent ? 'sent' : ''}">${e.email_sent ? 'sent' : '—'}</td></tr>`);
  document.getElementById('log').innerHTML = rows.join('');
}

document.getElementById('start').onclick = () =>
  fetch('/api/start_stream', { method: 'POST' }).then(refreshStatus);
document.getElementById('stop').onclick = () =>
  fetch('/api/stop_stream', { method: 'POST' }).then(refreshStatus);

setInterval(refreshStatus, 1000);
setInterval(refreshStats, 1000);
setInterval(refreshLogs, 2000);
refreshStatus(); refreshStats(); refreshLogs();
</script>
</body>
</html>
"#;
