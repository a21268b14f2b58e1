//! In-page bridge script.
//!
//! The script is injected into the host page (console paste, bookmarklet or
//! a browser extension's content script). Once loaded it:
//!
//! 1. Connects to the bridge server and sends READY
//! 2. Wraps `window.fetch` so every completed response is reported as a
//!    `network.responseCompleted` event carrying the request URL; the page
//!    still receives the original response
//! 3. Answers `page.advance` by scrolling the tracked container to its end
//!    and `page.info` with the page URL and title
//!
//! The tracked container is `[role="main"]` if present, else the first
//! `div` that scrolls vertically, else the document element.

// ============================================================================
// Public Functions
// ============================================================================

/// Generates the bridge script for a server at `ws_url`.
#[must_use]
pub fn bridge_script(ws_url: &str) -> String {
    let ws_url_json = serde_json::Value::from(ws_url).to_string();
    BRIDGE_SCRIPT_TEMPLATE.replace("$WS_URL", &ws_url_json)
}

/// Generates a `javascript:` bookmarklet that loads the bridge script.
#[must_use]
pub fn bridge_bookmarklet(ws_url: &str) -> String {
    format!("javascript:{}", urlencoding::encode(&bridge_script(ws_url)))
}

// ============================================================================
// Constants
// ============================================================================

/// Script template; `$WS_URL` is replaced by a JSON string literal.
const BRIDGE_SCRIPT_TEMPLATE: &str = r#"(() => {
  if (window.__scrollHarvestBridge) {
    console.warn("[scroll-harvest] bridge already installed");
    return;
  }

  const WS_URL = $WS_URL;
  const READY_ID = "00000000-0000-0000-0000-000000000000";
  const socket = new WebSocket(WS_URL);
  const backlog = [];

  const newId = () =>
    crypto.randomUUID
      ? crypto.randomUUID()
      : "10000000-1000-4000-8000-100000000000".replace(/[018]/g, (c) =>
          (c ^ (crypto.getRandomValues(new Uint8Array(1))[0] & (15 >> (c / 4)))).toString(16));

  const send = (message) => {
    const text = JSON.stringify(message);
    if (socket.readyState === WebSocket.OPEN) {
      socket.send(text);
    } else {
      backlog.push(text);
    }
  };

  socket.addEventListener("open", () => {
    socket.send(JSON.stringify({
      id: READY_ID,
      type: "success",
      result: { url: location.href, title: document.title },
    }));
    backlog.splice(0).forEach((text) => socket.send(text));
    console.log("[scroll-harvest] bridge connected");
  });

  const requestUrl = (input) => new URL(input && input.url ? input.url : String(input), location.href).href;

  const originalFetch = window.fetch;
  window.fetch = async function (...args) {
    const response = await originalFetch.apply(this, args);
    const url = requestUrl(args[0]);
    response
      .clone()
      .text()
      .then((body) => send({
        id: newId(),
        type: "event",
        method: "network.responseCompleted",
        params: { url, status: response.status, body },
      }))
      .catch(() => {});
    return response;
  };

  const isScrollable = (el) => {
    const overflow = getComputedStyle(el).overflowY;
    return (overflow === "auto" || overflow === "scroll") && el.scrollHeight > el.clientHeight;
  };

  let container = null;
  const trackedContainer = () => {
    if (container && container.isConnected) {
      return container;
    }
    container =
      document.querySelector('[role="main"]') ||
      Array.from(document.querySelectorAll("div")).find(isScrollable) ||
      document.documentElement;
    return container;
  };

  socket.addEventListener("message", (message) => {
    let request;
    try {
      request = JSON.parse(message.data);
    } catch (_) {
      return;
    }

    const reply = (result) =>
      socket.send(JSON.stringify({ id: request.id, type: "success", result }));
    const fail = (error, text) =>
      socket.send(JSON.stringify({ id: request.id, type: "error", error, message: text }));

    switch (request.method) {
      case "page.advance": {
        const selector = request.params && request.params.selector;
        const target = selector ? document.querySelector(selector) : trackedContainer();
        if (!target) {
          fail("no such element", `no element matches ${selector}`);
          return;
        }
        target.scrollTop = target.scrollHeight;
        reply({ scrollTop: target.scrollTop, scrollHeight: target.scrollHeight });
        return;
      }
      case "page.info":
        reply({ url: location.href, title: document.title });
        return;
      default:
        fail("unknown command", `unknown method ${request.method}`);
    }
  });

  socket.addEventListener("close", () => {
    window.fetch = originalFetch;
    delete window.__scrollHarvestBridge;
    console.log("[scroll-harvest] bridge closed");
  });

  window.__scrollHarvestBridge = socket;
})();
"#;

// ============================================================================
// Tests
// ============================================================================
