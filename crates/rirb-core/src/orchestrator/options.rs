/// Per-run flags that come from the CLI rather than the config file (§6).
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// No previous list expected; forces `dst_list` and tolerates a missing
    /// destination listing.
    pub init: bool,
    /// Compare against a fresh destination listing instead of the cached prior
    /// source listing; disables rename tracking.
    pub dst_list: bool,
    /// Plan only; issue no mutating sync-tool calls.
    pub dry_run: bool,
    /// Print the plan and prompt before transferring.
    pub interactive: bool,
    /// Elevate the debug log to the primary log and propagate errors with full
    /// context instead of the one-line summary.
    pub debug: bool,
}
