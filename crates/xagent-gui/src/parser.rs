//! Action parsing: model text to structured predictions
//!
//! The default parser understands the common vision-agent answer format:
//!
//! ```text
//! Thought: The submit button is at the bottom right.
//! Action: click(start_box='(912,866)')
//! ```
//!
//! Several calls may follow one `Action:` label, separated by newlines or
//! `;`. Parsing never fails: text that holds no recognizable call yields an
//! empty list.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use xagent_core::{ActionPrediction, ScreenContext};

/// Parser output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    pub parsed: Vec<ActionPrediction>,
}

/// Turns raw model text into actions. Must be pure and must not panic on
/// malformed input.
pub trait ActionParser: Send + Sync {
    fn parse(&self, text: &str, factors: (f64, f64), screen: &ScreenContext) -> ParsedOutput;
}

/// Parser for `Thought: ... Action: name(key='value', ...)` answers
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultActionParser;

impl ActionParser for DefaultActionParser {
    fn parse(&self, text: &str, factors: (f64, f64), screen: &ScreenContext) -> ParsedOutput {
        let (thought, action_section) = split_sections(text);

        let parsed = split_calls(action_section)
            .into_iter()
            .map(|(name, args)| {
                let mut inputs = BTreeMap::new();
                for (key, raw) in parse_arguments(args) {
                    let value = if key.ends_with("_box") {
                        normalize_box(&raw, factors)
                            .map(|coords| {
                                if let Some(center) = box_center(&coords, screen) {
                                    let coords_key = key.replace("_box", "_coords");
                                    inputs.insert(coords_key, serde_json::json!(center));
                                }
                                serde_json::json!(coords)
                            })
                            .unwrap_or(Value::String(raw))
                    } else {
                        Value::String(raw)
                    };
                    inputs.insert(key, value);
                }

                ActionPrediction {
                    action_type: name,
                    action_inputs: inputs,
                    thought: thought.clone(),
                }
            })
            .collect();

        ParsedOutput { parsed }
    }
}

/// Split text into the optional thought and the action section
fn split_sections(text: &str) -> (Option<String>, &str) {
    let action_at = text.find("Action:");
    let thought = text.find("Thought:").map(|start| {
        let body_start = start + "Thought:".len();
        let body_end = action_at.filter(|&a| a > body_start).unwrap_or(text.len());
        text[body_start..body_end].trim().to_string()
    });

    let section = match action_at {
        Some(at) => &text[at + "Action:".len()..],
        None => text,
    };

    (thought.filter(|t| !t.is_empty()), section)
}

/// Find every `identifier(...)` call, respecting quotes and nested parens
fn split_calls(section: &str) -> Vec<(String, &str)> {
    let bytes = section.as_bytes();
    let mut calls = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if !(bytes[i].is_ascii_alphabetic() || bytes[i] == b'_') {
            i += 1;
            continue;
        }

        let name_start = i;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
            i += 1;
        }
        let name_end = i;

        if i >= bytes.len() || bytes[i] != b'(' {
            continue;
        }

        let args_start = i + 1;
        let mut depth = 0usize;
        let mut quote: Option<u8> = None;
        let mut close = None;

        while i < bytes.len() {
            let b = bytes[i];
            match quote {
                Some(_) if b == b'\\' => i += 1,
                Some(q) if b == q && closes_quote(&section[i + 1..]) => quote = None,
                Some(_) => {}
                None => match b {
                    b'\'' | b'"' => quote = Some(b),
                    b'(' => depth += 1,
                    b')' => {
                        depth -= 1;
                        if depth == 0 {
                            close = Some(i);
                            break;
                        }
                    }
                    _ => {}
                },
            }
            i += 1;
        }

        match close {
            Some(end) => {
                calls.push((
                    section[name_start..name_end].to_string(),
                    &section[args_start..end],
                ));
                i = end + 1;
            }
            // Unbalanced call: nothing after it can be trusted
            None => break,
        }
    }

    calls
}

/// Parse `key='value', key2=value2` into pairs
fn parse_arguments(args: &str) -> Vec<(String, String)> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut chars = args.char_indices();

    while let Some((at, c)) = chars.next() {
        match quote {
            Some(_) if c == '\\' => {
                current.push(c);
                if let Some((_, escaped)) = chars.next() {
                    current.push(escaped);
                }
            }
            Some(q) if c == q && closes_quote(&args[at + 1..]) => {
                quote = None;
                current.push(c);
            }
            Some(_) => current.push(c),
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' | '[' => {
                    depth += 1;
                    current.push(c);
                }
                ')' | ']' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
                _ => current.push(c),
            },
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim())))
        })
        .collect()
}

/// A quote only closes a string when an argument separator or the end of
/// the call follows it, so apostrophes inside text stay part of the value
fn closes_quote(rest: &str) -> bool {
    matches!(rest.trim_start().chars().next(), None | Some(',') | Some(')'))
}

fn unquote(value: &str) -> String {
    for q in ['\'', '"'] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return value[1..value.len() - 1]
                .replace("\\'", "'")
                .replace("\\\"", "\"");
        }
    }
    value.to_string()
}

fn number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number regex is valid"))
}

/// Normalize a `(x,y)` or `(x1,y1,x2,y2)` box into screen fractions
fn normalize_box(raw: &str, factors: (f64, f64)) -> Option<Vec<f64>> {
    let numbers: Vec<f64> = number_pattern()
        .find_iter(raw)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();

    let (fx, fy) = factors;
    if fx <= 0.0 || fy <= 0.0 {
        return None;
    }

    match numbers.as_slice() {
        [x, y] => Some(vec![x / fx, y / fy, x / fx, y / fy]),
        [x1, y1, x2, y2] => Some(vec![x1 / fx, y1 / fy, x2 / fx, y2 / fy]),
        _ => None,
    }
}

/// Center of a normalized box in screen pixels
fn box_center(coords: &[f64], screen: &ScreenContext) -> Option<[f64; 2]> {
    if screen.width == 0 || screen.height == 0 || coords.len() != 4 {
        return None;
    }
    let cx = (coords[0] + coords[2]) / 2.0 * screen.width as f64;
    let cy = (coords[1] + coords[3]) / 2.0 * screen.height as f64;
    Some([cx.round(), cy.round()])
}
