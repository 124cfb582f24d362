/*
 * aurforge - AUR helper with recursive dependency builds.
 * Copyright (C) 2025  aurforge contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! PKGBUILD dependency extraction.
//!
//! Only the `depends` and `makedepends` arrays are read. The scanner
//! understands just enough bash to get those right: quoting, comments and
//! arrays spanning several lines.

use std::fmt;

/// Characters that start a version constraint
const CONSTRAINT_CHARS: [char; 3] = ['<', '=', '>'];

/// A declared dependency, e.g. `python>=3.10`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    raw: String,
}

impl DependencySpec {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The package name with any version constraint removed
    pub fn name(&self) -> &str {
        split_constraint(&self.raw).0
    }

    pub fn constraint(&self) -> Option<&str> {
        split_constraint(&self.raw).1
    }
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split a dependency string at the first constraint operator character.
///
/// Compound and malformed operators (`><`, `=<>`, `>=<`) end up entirely in
/// the constraint half, so the name is the same whichever one is used.
pub fn split_constraint(dep: &str) -> (&str, Option<&str>) {
    let dep = dep.trim();
    match dep.find(&CONSTRAINT_CHARS[..]) {
        Some(pos) => (dep[..pos].trim_end(), Some(&dep[pos..])),
        None => (dep, None),
    }
}

/// Runtime dependencies followed by build-time dependencies, in declaration order
pub fn extract_dependencies(recipe: &str) -> Vec<DependencySpec> {
    let mut tokens = parse_array(recipe, "depends");
    tokens.extend(parse_array(recipe, "makedepends"));

    let mut seen = std::collections::HashSet::new();
    tokens
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .map(DependencySpec::new)
        .collect()
}

/// Collect the elements of every `field=(...)` or `field+=(...)` assignment.
///
/// Assignments are recognised at the start of a line, so `depends` never
/// matches inside `makedepends` or `optdepends`.
pub fn parse_array(recipe: &str, field: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut offset = 0;

    for line in recipe.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        let trimmed = line.trim_start();
        let Some(rest) = trimmed.strip_prefix(field) else {
            continue;
        };
        let rest = match rest.strip_prefix("+=(") {
            Some(r) => r,
            None => match rest.strip_prefix("=(") {
                Some(r) => r,
                None => continue,
            },
        };

        let body_start = line_start + (line.len() - rest.len());
        values.extend(tokenize_array_body(&recipe[body_start..]));
    }

    values
}

/// Split an array body into words, stopping at the closing parenthesis
fn tokenize_array_body(body: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            } else {
                current.push(c);
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                in_token = true;
            }
            ')' => break,
            '#' if !in_token => {
                // Comment runs to end of line
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
            }
            '\\' => {
                if let Some(next) = chars.next() {
                    if next != '\n' {
                        current.push(next);
                        in_token = true;
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        tokens.push(current);
    }

    tokens.retain(|t| !t.is_empty());
    tokens
}
