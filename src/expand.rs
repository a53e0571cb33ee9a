//! Expansion of `${name}` placeholders in run-command templates.

use std::path::PathBuf;

use crate::options::BuildOptions;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpandError {
    #[error("unknown variable ${{{0}}}")]
    UnknownVariable(String),

    /// A list can't be spliced into a larger string: `${xvfb} foo` has no
    /// meaningful expansion.
    #[error("variable ${{{name}}} expands to a list and must stand alone, found in \"{token}\"")]
    ListInCompound { name: String, token: String },
}

/// The value of a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    /// Spliced into the surrounding token list. May be empty.
    List(Vec<String>),
}

/// Resolves placeholders against the options of the current invocation.
pub struct VariableExpander<'a> {
    options: &'a BuildOptions,
}

impl<'a> VariableExpander<'a> {
    pub fn new(options: &'a BuildOptions) -> Self {
        Self { options }
    }

    /// The name of the build directory, e.g. `Release-asan-x86`.
    pub fn base_build_dir(&self) -> String {
        let settings = &self.options.settings;
        let mut dir_name = String::from(if settings.is_debug { "Debug" } else { "Release" });
        if let Some(sanitizer) = settings.sanitizer() {
            dir_name.push_str(sanitizer.suffix());
        }
        if settings.target_os() != self.options.default_target_os {
            dir_name.push('-');
            dir_name.push_str(settings.target_os());
        }
        if settings.is_official_build {
            dir_name.insert_str(0, "Official-");
        }
        if let Some(cpu) = &settings.target_cpu {
            dir_name.push('-');
            dir_name.push_str(cpu);
        }
        dir_name
    }

    /// The path of the build directory, e.g. `out/Debug`.
    pub fn build_dir(&self) -> PathBuf {
        self.options.out_dir.join(self.base_build_dir())
    }

    pub fn get_value(&self, name: &str) -> Result<Value, ExpandError> {
        let options = self.options;
        let s = |v: &str| Ok(Value::Str(v.to_string()));
        match name {
            "out" | "out_dir" => s(&options.out_dir.to_string_lossy()),
            "Build_type" => s(if options.settings.is_debug { "Debug" } else { "Release" }),
            "build_type" => s(if options.settings.is_debug { "debug" } else { "release" }),
            "jobs" => s(&options.jobs.to_string()),
            "testjobs" => s(&options.test_jobs.to_string()),
            "Build_dir" => s(&self.build_dir().to_string_lossy()),
            "root_dir" => s(&options.env.src_root_dir.to_string_lossy()),
            "layout_dir" => s(&options
                .env
                .src_root_dir
                .join("third_party")
                .join("WebKit")
                .join("LayoutTests")
                .to_string_lossy()),
            "HOME" => match &options.env.home_dir {
                Some(home) => s(&home.to_string_lossy()),
                None => Err(ExpandError::UnknownVariable(name.to_string())),
            },
            "xvfb" if options.env.build_platform == "linux" => Ok(Value::List(vec![
                "python".into(),
                "testing/xvfb.py".into(),
            ])),
            "xvfb" => Ok(Value::List(vec![])),
            "run_args" => Ok(Value::List(options.run_args.clone())),
            "android_device" => match &options.android_device {
                Some(device) => s(device),
                None => Err(ExpandError::UnknownVariable(name.to_string())),
            },
            _ => Err(ExpandError::UnknownVariable(name.to_string())),
        }
    }

    /// Expand every placeholder in a single token, left to right.
    ///
    /// Substituted text is not scanned again. A list-valued placeholder is
    /// only accepted when it is the whole token.
    pub fn expand_token(&self, token: &str) -> Result<Value, ExpandError> {
        let mut value = token.to_string();
        let mut search_from = 0;
        while let Some((start, end)) = find_placeholder(&value, search_from) {
            let name = &value[start + 2..end - 1];
            match self.get_value(name)? {
                Value::Str(s) => {
                    value.replace_range(start..end, &s);
                    search_from = start + s.len();
                }
                Value::List(items) if start == 0 && end == value.len() => {
                    return Ok(Value::List(items));
                }
                Value::List(_) => {
                    return Err(ExpandError::ListInCompound {
                        name: name.to_string(),
                        token: token.to_string(),
                    });
                }
            }
        }
        Ok(Value::Str(value))
    }

    /// Expand a token list, splicing list values in place.
    pub fn expand(&self, tokens: &[String]) -> Result<Vec<String>, ExpandError> {
        let mut expanded = Vec::with_capacity(tokens.len());
        for token in tokens {
            match self.expand_token(token)? {
                Value::Str(s) => expanded.push(s),
                Value::List(items) => expanded.extend(items),
            }
        }
        Ok(expanded)
    }
}

/// Find the byte range of the next non-empty `${...}` at or after `from`.
fn find_placeholder(s: &str, from: usize) -> Option<(usize, usize)> {
    let mut from = from;
    loop {
        let start = from + s.get(from..)?.find("${")?;
        let close = start + 2 + s[start + 2..].find('}')?;
        if close > start + 2 {
            return Some((start, close + 1));
        }
        from = close + 1;
    }
}
