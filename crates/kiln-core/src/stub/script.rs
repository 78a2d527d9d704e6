//! Bootstrap script generation.
//!
//! The stub is a POSIX `sh` script. Layout:
//!
//! ```text
//! #!/bin/sh
//! # <banner lines>
//! KILN_RUNTIME / KILN_ENTRY / KILN_REQUIREMENTS assignments
//! kiln_version_probe / kiln_extensions_probe functions
//! IO negotiation (argv + SHELL_VERBOSITY + terminal), exported back to
//!   the runtime as SHELL_VERBOSITY
//! requirement check (omitted when disabled or nothing is required)
//! payload extraction and dispatch
//! __KILN_HALT__
//! ```
//!
//! The payload header line follows the halt marker directly.

use super::{BootstrapStub, StubOptions, HALT_MARKER};
use crate::error::{BuildError, BuildResult};
use crate::requirements::{RequirementKind, RequirementManifest};

/// Prefix of the function that prints the runtime version.
pub(super) const VERSION_PROBE_FN: &str = "kiln_version_probe() { \"$KILN_RUNTIME\"";
/// Prefix of the function that lists loaded runtime extensions.
pub(super) const EXTENSIONS_PROBE_FN: &str = "kiln_extensions_probe() { \"$KILN_RUNTIME\"";
const PROBE_FN_END: &str = "; }";

const NEGOTIATION: &str = r#"kiln_nl='
'
set -f

kiln_verbose_level() {
    case "$1" in
        ''|*[!0-9]*) echo 2 ;;
        ??????????*) echo 4 ;;
        *) if [ "$1" -ge 3 ]; then echo 4; elif [ "$1" -eq 2 ]; then echo 3; else echo 2; fi ;;
    esac
}

kiln_env_level() {
    kiln_digits=${1#-}
    case "$kiln_digits" in
        ''|*[!0-9]*) return 1 ;;
        ??????????*) kiln_magnitude=3 ;;
        *) kiln_magnitude=$kiln_digits ;;
    esac
    if [ "$kiln_magnitude" -eq 0 ]; then
        echo 1
    elif [ "$kiln_digits" != "$1" ]; then
        echo 0
    elif [ "$kiln_magnitude" -ge 3 ]; then
        echo 4
    else
        echo $((kiln_magnitude + 1))
    fi
}

kiln_quiet=0
kiln_no_interaction=0
kiln_verbose=1
kiln_expect_value=0
for kiln_token in $*; do
    if [ "$kiln_expect_value" = 1 ]; then
        kiln_expect_value=0
        case "$kiln_token" in
            ''|*[!0-9]*) ;;
            *)
                kiln_level=$(kiln_verbose_level "$kiln_token")
                if [ "$kiln_level" -gt "$kiln_verbose" ]; then kiln_verbose=$kiln_level; fi
                continue
                ;;
        esac
    fi
    kiln_level=
    case "$kiln_token" in
        --) break ;;
        -q|--quiet) kiln_quiet=1 ;;
        -n|--no-interaction) kiln_no_interaction=1 ;;
        --verbose) kiln_level=2; kiln_expect_value=1 ;;
        --verbose=*) kiln_level=$(kiln_verbose_level "${kiln_token#--verbose=}") ;;
        -v*)
            case "${kiln_token#-}" in
                *[!v]*) ;;
                v) kiln_level=2 ;;
                vv) kiln_level=3 ;;
                *) kiln_level=4 ;;
            esac
            ;;
    esac
    if [ -n "$kiln_level" ] && [ "$kiln_level" -gt "$kiln_verbose" ]; then
        kiln_verbose=$kiln_level
    fi
done

if [ "$kiln_quiet" = 1 ]; then kiln_verbosity=0; else kiln_verbosity=$kiln_verbose; fi
if [ -n "${SHELL_VERBOSITY+set}" ] && kiln_env=$(kiln_env_level "$SHELL_VERBOSITY"); then
    kiln_verbosity=$kiln_env
fi
kiln_interactive=0
if [ -t 0 ] && [ "$kiln_no_interaction" = 0 ] && [ "$kiln_quiet" = 0 ] && [ "$kiln_verbosity" -gt 0 ]; then
    kiln_interactive=1
fi
SHELL_VERBOSITY=$((kiln_verbosity - 1))
export SHELL_VERBOSITY
"#;

const CHECK_FUNCTIONS: &str = r#"
kiln_failures=
kiln_fail() {
    kiln_failures="$kiln_failures$(printf 'kiln-requirement-failure\t%s\t%s\t%s' "$1" "$2" "$3")$kiln_nl"
}

kiln_version_ge() {
    awk -v kiln_a="$1" -v kiln_b="$2" 'BEGIN {
        na = split(kiln_a, a, ".")
        nb = split(kiln_b, b, ".")
        for (i = 1; i <= 3; i++) {
            x = (i <= na) ? a[i] + 0 : 0
            y = (i <= nb) ? b[i] + 0 : 0
            if (x > y) exit 0
            if (x < y) exit 1
        }
        exit 0
    }'
}

kiln_require_version() {
    if [ -z "$kiln_runtime_version" ] || ! kiln_version_ge "$kiln_runtime_version" "$1"; then
        kiln_fail runtime-version "$1" "found ${kiln_runtime_version:-unknown} (required by $2)"
    fi
}

kiln_has_extension() {
    printf '%s\n' "$kiln_runtime_extensions" | grep -ixF -e "$1" >/dev/null 2>&1
}

kiln_require_extension() {
    kiln_has_extension "$1" || kiln_fail extension "$1" "missing (required by $2)"
}

kiln_reject_extension() {
    if kiln_has_extension "$1"; then
        kiln_fail conflicting-extension "$1" "loaded (excluded by $2)"
    fi
}

kiln_report() {
    if [ -z "$kiln_failures" ]; then
        if [ "$kiln_verbosity" -ge 2 ]; then echo "kiln: all requirements satisfied" >&2; fi
        return 0
    fi
    if [ "$kiln_interactive" = 1 ]; then
        {
            echo "kiln: this application cannot run with $KILN_RUNTIME:"
            printf '%s' "$kiln_failures" | awk -F '\t' '{ printf "  - [%s] %s: %s\n", $2, $3, $4 }'
            printf 'Press enter to exit. '
        } >&2
        read kiln_answer || true
    else
        printf '%s' "$kiln_failures" >&2
    fi
    exit 1
}
"#;

const VERSION_SED: &str =
    r"s/^[^0-9]*\([0-9][0-9]*\.[0-9][0-9]*\(\.[0-9][0-9]*\)\{0,1\}\).*$/\1/p";

const EXTRACT: &str = r#"
kiln_line=$(awk '/^__KILN_HALT__$/ { print NR + 1; exit }' "$0")
if [ -z "$kiln_line" ]; then
    echo "kiln: payload marker not found in $0" >&2
    exit 1
fi
kiln_header=$(tail -n +"$kiln_line" "$0" | head -n 1)
kiln_compression=$(printf '%s\n' "$kiln_header" | awk '{ print $2 }')
kiln_length=$(printf '%s\n' "$kiln_header" | awk '{ print $3 }')
case "$kiln_compression" in
    none) kiln_inflate=cat ;;
    gzip) kiln_inflate='gzip -dc' ;;
    zstd) kiln_inflate='zstd -dcq' ;;
    *) echo "kiln: unsupported payload compression '$kiln_compression'" >&2; exit 1 ;;
esac
kiln_dir=$(mktemp -d "${TMPDIR:-/tmp}/kiln.XXXXXX") || exit 1
if ! tail -n +"$((kiln_line + 1))" "$0" | head -c "$kiln_length" | $kiln_inflate | tar -xf - -C "$kiln_dir"; then
    echo "kiln: failed to extract $0" >&2
    rm -rf "$kiln_dir"
    exit 1
fi
"$KILN_RUNTIME" "$kiln_dir/$KILN_ENTRY" "$@"
kiln_status=$?
rm -rf "$kiln_dir"
exit "$kiln_status"
"#;

/// Single-quote `value` for `sh`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Inverse of [`shell_quote`]. Accepts any concatenation of single-quoted
/// segments and `\'`.
pub fn shell_unquote(quoted: &str) -> Option<String> {
    let mut out = String::with_capacity(quoted.len());
    let mut rest = quoted;
    while !rest.is_empty() {
        if let Some(body) = rest.strip_prefix('\'') {
            let close = body.find('\'')?;
            out.push_str(&body[..close]);
            rest = &body[close + 1..];
        } else if let Some(after) = rest.strip_prefix(r"\'") {
            out.push('\'');
            rest = after;
        } else {
            return None;
        }
    }
    Some(out)
}

/// Split a sequence of [`shell_quote`]d words separated by spaces.
pub fn shell_unquote_words(quoted: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut start = None;
    let mut in_quote = false;
    let mut escaped = false;
    for (i, c) in quoted.char_indices() {
        if escaped {
            escaped = false;
        } else {
            match c {
                '\\' if !in_quote => escaped = true,
                '\'' => in_quote = !in_quote,
                ' ' if !in_quote => {
                    if let Some(s) = start.take() {
                        words.push(shell_unquote(&quoted[s..i])?);
                    }
                    continue;
                }
                _ => {}
            }
        }
        start.get_or_insert(i);
    }
    if in_quote || escaped {
        return None;
    }
    if let Some(s) = start {
        words.push(shell_unquote(&quoted[s..])?);
    }
    Some(words)
}

/// Arguments of a probe function line, if `line` defines the probe.
pub(super) fn probe_args(line: &str, prefix: &str) -> Option<Vec<String>> {
    let args = line.strip_prefix(prefix)?.strip_suffix(PROBE_FN_END)?;
    shell_unquote_words(args)
}

/// Every value that lands inside a single stub line must stay on that line.
pub(super) fn check_embeddable(
    options: &StubOptions,
    manifest: &RequirementManifest,
) -> BuildResult<()> {
    let single_line = |option: &str, value: &str| {
        if value.contains(['\n', '\r', '\0']) {
            Err(BuildError::unsupported(option, value.escape_debug().to_string()))
        } else {
            Ok(())
        }
    };
    single_line("runtime command", &options.runtime)?;
    single_line("stub shebang", &options.shebang)?;
    for arg in options.version_probe.iter().chain(&options.extensions_probe) {
        single_line("runtime probe argument", arg)?;
    }
    for req in manifest.requirements() {
        single_line("requirement identifier", &req.identifier)?;
        for name in &req.declared_by {
            single_line("dependency name", name)?;
        }
    }
    for conflict in manifest.conflicts() {
        single_line("requirement identifier", &conflict.extension)?;
        single_line("dependency name", &conflict.describe())?;
    }
    Ok(())
}

pub(super) fn render_script(
    options: &StubOptions,
    manifest: &RequirementManifest,
    entry_point: &str,
) -> BootstrapStub {
    let mut script = String::with_capacity(8 * 1024);
    script.push_str(&options.shebang);
    script.push('\n');
    script.push_str("# kiln bootstrap: checks requirements, extracts the payload and runs it.\n");
    script.push_str(&format!(
        "KILN_RUNTIME=${{KILN_RUNTIME:-{}}}\n",
        shell_quote(&options.runtime)
    ));
    script.push_str(&format!("KILN_ENTRY={}\n", shell_quote(entry_point)));
    script.push_str(&format!(
        "KILN_REQUIREMENTS={}\n",
        shell_quote(&manifest.to_json())
    ));
    script.push_str(&format!(
        "{VERSION_PROBE_FN}{}{PROBE_FN_END}\n",
        quoted_args(&options.version_probe)
    ));
    script.push_str(&format!(
        "{EXTENSIONS_PROBE_FN}{}{PROBE_FN_END}\n",
        quoted_args(&options.extensions_probe)
    ));
    script.push_str(NEGOTIATION);

    if options.check_requirements && !manifest.is_empty() {
        script.push_str(CHECK_FUNCTIONS);
        script.push_str(&check_block(manifest));
    }

    script.push_str(EXTRACT);
    script.push_str(HALT_MARKER);
    script.push('\n');

    BootstrapStub {
        script,
        entry_point: entry_point.to_string(),
        manifest: manifest.clone(),
    }
}

fn check_block(manifest: &RequirementManifest) -> String {
    let mut block = String::from("\nif [ \"${KILN_REQUIREMENT_CHECKER:-1}\" != 0 ]; then\n");
    for conflict in manifest.conflicts() {
        block.push_str(&format!(
            "    kiln_fail unsatisfiable {} {}\n",
            shell_quote(&conflict.extension),
            shell_quote(&conflict.describe())
        ));
    }
    block.push_str("    if command -v \"$KILN_RUNTIME\" >/dev/null 2>&1; then\n");

    if manifest.runtime_floor().is_some() {
        block.push_str(&format!(
            "        kiln_runtime_version=$(kiln_version_probe 2>/dev/null | sed -n {} | head -n 1)\n",
            shell_quote(VERSION_SED)
        ));
    }
    let needs_extensions = manifest.requirements().iter().any(|r| {
        matches!(
            r.kind,
            RequirementKind::ExtensionPresent | RequirementKind::ConflictingExtension
        )
    });
    if needs_extensions {
        block.push_str("        kiln_runtime_extensions=$(kiln_extensions_probe 2>/dev/null)\n");
    }

    for req in manifest.requirements() {
        let function = match req.kind {
            RequirementKind::RuntimeVersionMin => "kiln_require_version",
            RequirementKind::ExtensionPresent => "kiln_require_extension",
            RequirementKind::ConflictingExtension => "kiln_reject_extension",
        };
        block.push_str(&format!(
            "        {function} {} {}\n",
            shell_quote(&req.identifier),
            shell_quote(&req.declared_by.join(", "))
        ));
    }

    block.push_str("    else\n");
    block.push_str("        kiln_fail runtime \"$KILN_RUNTIME\" 'not found'\n");
    block.push_str("    fi\n");
    block.push_str("    kiln_report\n");
    block.push_str("fi\n");
    block
}

fn quoted_args(args: &[String]) -> String {
    args.iter().map(|a| format!(" {}", shell_quote(a))).collect()
}
