//! Pathname expansion against the virtual filesystem.
//!
//! Walks the pattern segment by segment: literal segments descend directly,
//! wildcard segments filter directory entries, and `**` (with globstar)
//! spans any number of directory levels. Dotfiles stay hidden from
//! wildcards unless `dotglob` is on or the segment spells the dot
//! literally; `.` and `..` are never wildcard matches.

use crate::expand::pattern::{self, PatternOpts};
use crate::interp::host::HostBridge;
use crate::interp::state::ShoptOptions;

#[derive(Clone)]
struct Candidate {
    /// Path as it will be printed (pattern-relative).
    display: String,
    /// Absolute path for filesystem access.
    absolute: String,
}

/// Expand `pattern` (with backslash escapes protecting literal characters)
/// against the filesystem. Returns matches sorted; empty means no match.
pub fn expand_glob(
    host: &HostBridge,
    cwd: &str,
    pattern: &str,
    shopts: &ShoptOptions,
) -> Vec<String> {
    let absolute = pattern.starts_with('/');
    let trimmed = if absolute { &pattern[1..] } else { pattern };
    let wants_dir = trimmed.ends_with('/');
    let trimmed = trimmed.trim_end_matches('/');
    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.is_empty() || trimmed.is_empty() {
        return Vec::new();
    }

    let mut candidates = vec![Candidate {
        display: if absolute { "/".to_string() } else { String::new() },
        absolute: if absolute { "/".to_string() } else { cwd.to_string() },
    }];

    let opts = PatternOpts {
        extglob: shopts.extglob,
        case_insensitive: shopts.nocaseglob,
    };

    for (i, segment) in segments.iter().enumerate() {
        let last = i == segments.len() - 1;
        let mut next: Vec<Candidate> = Vec::new();

        if *segment == "**" && shopts.globstar {
            // Zero or more directory levels; at the final position every
            // descendant (file or directory) matches.
            for candidate in &candidates {
                if last {
                    collect_descendants(host, candidate, shopts, &mut next);
                } else {
                    next.push(candidate.clone());
                    collect_dirs_recursive(host, candidate, shopts, &mut next);
                }
            }
        } else if !pattern::has_glob_chars(segment, shopts.extglob) {
            let literal = pattern::unescape_glob(segment);
            for candidate in &candidates {
                let abs = host.resolve_path(&candidate.absolute, &literal);
                if host.exists(&abs) {
                    next.push(Candidate {
                        display: join_display(&candidate.display, &literal),
                        absolute: abs,
                    });
                }
            }
        } else {
            for candidate in &candidates {
                let entries = match host.read_dir(&candidate.absolute) {
                    Ok(entries) => entries,
                    Err(_) => continue,
                };
                for entry in entries {
                    if !name_visible(&entry.name, segment, shopts) {
                        continue;
                    }
                    if pattern::matches_pattern(&entry.name, segment, opts) {
                        next.push(Candidate {
                            display: join_display(&candidate.display, &entry.name),
                            absolute: host.resolve_path(&candidate.absolute, &entry.name),
                        });
                    }
                }
            }
        }

        // Intermediate segments must be directories.
        if !last {
            next.retain(|c| host.is_dir(&c.absolute));
        }
        candidates = next;
        if candidates.is_empty() {
            return Vec::new();
        }
    }

    if wants_dir {
        candidates.retain(|c| host.is_dir(&c.absolute));
    }

    let mut out: Vec<String> = candidates
        .into_iter()
        .map(|c| {
            if wants_dir {
                format!("{}/", c.display)
            } else {
                c.display
            }
        })
        .collect();
    out.sort();
    out.dedup();
    out
}

fn join_display(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else if prefix.ends_with('/') {
        format!("{}{}", prefix, name)
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Wildcards skip dotfiles unless dotglob is on or the segment starts with
/// a literal dot, and never match `.` or `..`.
fn name_visible(name: &str, segment: &str, shopts: &ShoptOptions) -> bool {
    if name == "." || name == ".." {
        return false;
    }
    if name.starts_with('.') {
        return shopts.dotglob || segment.starts_with('.') || segment.starts_with("\\.");
    }
    true
}

fn collect_dirs_recursive(
    host: &HostBridge,
    base: &Candidate,
    shopts: &ShoptOptions,
    out: &mut Vec<Candidate>,
) {
    let entries = match host.read_dir(&base.absolute) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries {
        if entry.name.starts_with('.') && !shopts.dotglob {
            continue;
        }
        if !entry.is_directory {
            continue;
        }
        let candidate = Candidate {
            display: join_display(&base.display, &entry.name),
            absolute: host.resolve_path(&base.absolute, &entry.name),
        };
        out.push(candidate.clone());
        collect_dirs_recursive(host, &candidate, shopts, out);
    }
}

fn collect_descendants(
    host: &HostBridge,
    base: &Candidate,
    shopts: &ShoptOptions,
    out: &mut Vec<Candidate>,
) {
    let entries = match host.read_dir(&base.absolute) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries {
        if entry.name.starts_with('.') && !shopts.dotglob {
            continue;
        }
        let candidate = Candidate {
            display: join_display(&base.display, &entry.name),
            absolute: host.resolve_path(&base.absolute, &entry.name),
        };
        out.push(candidate.clone());
        if entry.is_directory {
            collect_descendants(host, &candidate, shopts, out);
        }
    }
}
