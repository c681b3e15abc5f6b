//! Substring matches on parser messages mapped to help text.

pub(crate) const YAML_HINTS: [(&str, &str); 7] = [
    (
        "did not find expected '-'",
        "Start list items with '-' and ensure proper indentation.",
    ),
    (
        "mapping values are not allowed",
        "Check for a stray ':' or add quotes around values where needed.",
    ),
    (
        "found character that cannot start any token",
        "Remove stray characters and ensure indentation uses spaces (no tabs).",
    ),
    (
        "missing one of command, copy, or substitute",
        "Give every task exactly one action: `command`, `copy: true` or `substitute`.",
    ),
    (
        "are mutually exclusive",
        "Keep only one of `command`, `copy` and `substitute` on the task.",
    ),
    (
        "missing field `targets`",
        "Every task must declare the files it produces under `targets`.",
    ),
    (
        "unknown field",
        "Check the key for typos against the documented manifest fields.",
    ),
];
