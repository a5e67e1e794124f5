//! Host capabilities that extensions can `require`.
//!
//! A capability is a CommonJS module body evaluated inside the extension's
//! isolate with `(module, exports, require, host)` in scope. Built-in
//! capabilities receive a `host` object bridging to Rust ops; modules
//! registered from configuration get `host = undefined`.

use std::collections::BTreeMap;

use serde::Serialize;

const PATH_MODULE: &str = r#"
const normalize = (p) => {
    const absolute = p.startsWith("/");
    const out = [];
    for (const part of p.split("/")) {
        if (part === "" || part === ".") continue;
        if (part === "..") {
            if (out.length > 0 && out[out.length - 1] !== "..") out.pop();
            else if (!absolute) out.push("..");
            continue;
        }
        out.push(part);
    }
    const joined = out.join("/");
    return absolute ? "/" + joined : (joined || ".");
};
const basename = (p, ext) => {
    const base = p.replace(/\/+$/, "").split("/").pop() || "";
    return ext && base.endsWith(ext) ? base.slice(0, -ext.length) : base;
};
const dirname = (p) => {
    const trimmed = p.replace(/\/+$/, "");
    const idx = trimmed.lastIndexOf("/");
    if (idx < 0) return ".";
    return idx === 0 ? "/" : trimmed.slice(0, idx);
};
const extname = (p) => {
    const base = basename(p);
    const idx = base.lastIndexOf(".");
    return idx <= 0 ? "" : base.slice(idx);
};
module.exports = {
    sep: "/",
    normalize,
    basename,
    dirname,
    extname,
    join: (...parts) => normalize(parts.filter((s) => s !== "").join("/")),
};
module.exports.posix = module.exports;
"#;

const QUERYSTRING_MODULE: &str = r#"
module.exports = {
    parse(text) {
        const out = {};
        for (const pair of String(text).replace(/^\?/, "").split("&")) {
            if (!pair) continue;
            const [k, v = ""] = pair.split("=");
            const key = decodeURIComponent(k.replace(/\+/g, " "));
            const value = decodeURIComponent(v.replace(/\+/g, " "));
            if (key in out) out[key] = [].concat(out[key], value);
            else out[key] = value;
        }
        return out;
    },
    stringify(obj) {
        return Object.keys(obj || {})
            .flatMap((k) => [].concat(obj[k]).map((v) =>
                encodeURIComponent(k) + "=" + encodeURIComponent(v == null ? "" : v)))
            .join("&");
    },
};
"#;

const MARKDOWN_MODULE: &str = r#"
module.exports = { render: (text) => host.render(String(text)) };
"#;

const FS_MODULE: &str = r#"
const readFileSync = (path) => host.readFile(String(path));
module.exports = {
    readFileSync,
    readFile(path, ...rest) {
        const callback = rest.pop();
        try {
            const text = readFileSync(path);
            Promise.resolve().then(() => callback(null, text));
        } catch (err) {
            Promise.resolve().then(() => callback(err));
        }
    },
    promises: { readFile: async (path) => readFileSync(path) },
};
"#;

const FS_PROMISES_MODULE: &str = r#"
module.exports = { readFile: async (path) => host.readFile(String(path)) };
"#;

/// Source of one capability module as handed to the isolate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilitySource {
    pub source: String,
    pub builtin: bool,
}

/// Name → module registry consulted after the whitelist admits a request.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    modules: BTreeMap<String, CapabilitySource>,
}

impl CapabilityRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the host's built-in capabilities.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (name, source) in [
            ("path", PATH_MODULE),
            ("path/posix", PATH_MODULE),
            ("querystring", QUERYSTRING_MODULE),
            ("markdown", MARKDOWN_MODULE),
            ("fs", FS_MODULE),
            ("fs/promises", FS_PROMISES_MODULE),
        ] {
            registry.modules.insert(
                name.to_string(),
                CapabilitySource {
                    source: source.to_string(),
                    builtin: true,
                },
            );
        }
        registry
    }

    /// Register a CommonJS module supplied by the operator.
    ///
    /// Replaces any capability with the same name, built-ins included.
    pub fn register(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.modules.insert(
            name.into(),
            CapabilitySource {
                source: source.into(),
                builtin: false,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&CapabilitySource> {
        self.modules.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}
