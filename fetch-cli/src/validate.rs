use fetch_core::resolve::RawFlags;

use crate::cli::Cli;

/// Validate CLI flags and produce the raw flag record.
///
/// Hard errors return `Err(message)`. Warnings go to stderr but do not
/// prevent execution. Rules are checked in order.
pub fn validate(cli: &Cli) -> Result<RawFlags, String> {
    // Rule 1: --timeout must be positive.
    if let Some(t) = cli.timeout {
        if t <= 0.0 || !t.is_finite() {
            return Err("The --timeout argument must be a positive number of seconds.".into());
        }
    }

    // Rule 2: --connect-timeout must be positive.
    if let Some(t) = cli.connect_timeout {
        if t <= 0.0 || !t.is_finite() {
            return Err(
                "The --connect-timeout argument must be a positive number of seconds.".into(),
            );
        }
    }

    // Rule 3: a URL is required unless an alternate mode runs instead.
    if cli.url.is_none() && cli.from_curl.is_none() && !cli.update && cli.complete.is_none() {
        return Err("No URL provided.".into());
    }

    // Rule 4: --cert and --key must both be present or both absent.
    if cli.cert.is_some() != cli.key.is_some() {
        return Err(
            "The --cert and --key arguments must be used together and both be present.".into(),
        );
    }

    // Rule 5: --proto-file and --proto-desc are mutually exclusive.
    if !cli.proto_file.is_empty() && cli.proto_desc.is_some() {
        return Err("Use either --proto-file or --proto-desc, but not both.".into());
    }

    // Rule 6: --proto-message requires a schema source.
    if cli.proto_message.is_some() && cli.proto_file.is_empty() && cli.proto_desc.is_none() {
        return Err(
            "The --proto-message argument requires --proto-file or --proto-desc.".into(),
        );
    }

    // Rule 7: --update does not combine with a request.
    if cli.update && (cli.url.is_some() || cli.from_curl.is_some()) {
        return Err("The --update flag cannot be combined with a request.".into());
    }

    // Rule 8: --silent and --verbose conflict; silence wins is surprising,
    // so reject the combination outright.
    if cli.silent && cli.verbose > 0 {
        return Err("The --silent and --verbose arguments are mutually exclusive.".into());
    }

    // Rule 9: --output with --dry-run is unused.
    if cli.dry_run && cli.output.is_some() {
        warn("The --output argument is not used with --dry-run.");
    }

    // Rule 10: proto schema flags without a likely protobuf response are
    // harmless; no warning. (The formatter reports a missing schema when a
    // protobuf content type actually arrives.)

    let raw = cli.to_raw_flags();

    // Rule 11: exclusive groups and required-by pairs, shared with the
    // resolver so the invariant holds after the curl merge too.
    raw.check_exclusions().map_err(|e| e.to_string())?;

    Ok(raw)
}

fn warn(msg: &str) {
    eprintln!("Warning: {msg}");
}
