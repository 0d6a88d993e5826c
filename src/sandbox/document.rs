//! The sandbox document builder: the bootstrap program evaluated inside a
//! freshly created context, before any user code can run.

/// Global the host installs before evaluating the document. The document
/// captures it into a closure and deletes the global, so user code cannot
/// re-acquire the raw channel.
pub(crate) const POST_FN: &str = "__post_message";

/// Global the document installs; the worker invokes it with the raw text of
/// every inbound host message.
pub(crate) const RECEIVE_FN: &str = "__receive";

/// Produce the full content of the isolated context's bootstrap document.
///
/// The document installs the console shims and the inbound run listener,
/// then emits one `ready` event. It is a pure constant: the bridge compares
/// the loaded content against this output to detect a stale context.
pub fn sandbox_document() -> &'static str {
    BOOTSTRAP
}

const BOOTSTRAP: &str = r#"(function () {
  var post = __post_message;
  delete globalThis.__post_message;

  function send(type, payload) {
    var message = { source: 'playground', type: type };
    if (payload !== undefined) {
      message.payload = payload;
    }
    try {
      post(JSON.stringify(message));
    } catch (encodeErr) {
      // Unencodable payload (e.g. circular): degrade to its string form
      message.payload = String(payload);
      post(JSON.stringify(message));
    }
  }

  function describe(failure) {
    if (failure && failure.message !== undefined) {
      return String(failure.message);
    }
    return String(failure);
  }

  globalThis.console = {
    log: function () {
      send('log', Array.prototype.slice.call(arguments));
    },
    error: function (failure) {
      send('error', describe(failure));
    }
  };

  globalThis.__receive = function (raw) {
    var message;
    try {
      message = JSON.parse(raw);
    } catch (parseErr) {
      return;
    }
    if (!message || message.source !== 'playground-parent' || message.type !== 'run') {
      return;
    }
    try {
      (0, eval)(message.code);
    } catch (failure) {
      send('error', describe(failure));
    }
  };

  send('ready');
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_is_a_pure_constant() {
        assert_eq!(sandbox_document(), sandbox_document());
    }

    #[test]
    fn document_validates_the_host_source_tag() {
        let document = sandbox_document();
        assert!(document.contains("'playground-parent'"));
        assert!(document.contains("'run'"));
    }

    #[test]
    fn document_installs_shims_and_listener() {
        let document = sandbox_document();
        assert!(document.contains("globalThis.console"));
        assert!(document.contains(RECEIVE_FN));
        assert!(document.contains("send('ready')"));
        // The raw channel must not stay reachable from user code
        assert!(document.contains(&format!("delete globalThis.{POST_FN}")));
    }
}
