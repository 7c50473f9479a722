//! Network file loaders.
//!
//! Two formats are understood:
//!
//! **Pajek** (`.net`):
//!
//! ```text
//! *Vertices 3
//! 1 "Name of first node" 1.0
//! 2 "Name of second node" 2.0
//! 3 "Name of third node"
//! *Arcs
//! 1 2 1.0
//! 1 3 1.7
//! 2 3
//! ```
//!
//! Vertices are assumed to be listed in order `1..=N`. The trailing number on a
//! vertex line is its teleportation weight (default 1). Only vertices that are
//! listed or that appear on a link line are created, so `N` bounds the ids but
//! never sizes an allocation by itself. `*Arcs` lines are
//! directed; `*Edges` lines add both directions. A missing link weight is 1.
//!
//! **Link list** (anything else): one `from to [weight]` per line, `#` starts a
//! comment. Node identifiers are arbitrary tokens, numbered densely in order of
//! first appearance and used verbatim as node names.

use super::Network;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Load a Pajek network from disk.
pub fn load_pajek(path: impl AsRef<Path>) -> Result<Network> {
    let file = File::open(path.as_ref())?;
    read_pajek(BufReader::new(file))
}

/// Load a link-list network from disk.
pub fn load_link_list(path: impl AsRef<Path>) -> Result<Network> {
    let file = File::open(path.as_ref())?;
    read_link_list(BufReader::new(file))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Arcs,
    Edges,
}

/// Parse a Pajek network.
pub fn read_pajek<R: BufRead>(reader: R) -> Result<Network> {
    let mut lines = reader.lines().enumerate().peekable();

    // Header: first non-blank, non-comment line must be `*Vertices N`.
    let n_nodes = loop {
        let Some((idx, line)) = lines.next() else {
            return Err(Error::EmptyInput);
        };
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }
        let mut tokens = trimmed.split_whitespace();
        let keyword = tokens.next().unwrap_or_default();
        if !keyword.eq_ignore_ascii_case("*vertices") {
            return Err(parse_error(idx, "the network file is not in Pajek format"));
        }
        let count = tokens
            .next()
            .and_then(|t| t.parse::<usize>().ok())
            .ok_or_else(|| parse_error(idx, "missing vertex count"))?;
        break count;
    };
    if n_nodes == 0 {
        return Err(Error::EmptyInput);
    }

    let mut network = Network::new();
    while network.node_count() < n_nodes {
        let Some((idx, line)) = lines.peek() else {
            break;
        };
        let idx = *idx;
        let line = match line {
            Ok(l) => l.trim().to_string(),
            Err(e) => return Err(Error::Io(e.to_string())),
        };
        if line.starts_with('*') {
            break;
        }
        let _ = lines.next();
        if line.is_empty() {
            continue;
        }
        let (name, weight) = parse_vertex_line(&line).ok_or_else(|| {
            parse_error(idx, "expected '<id> [\"name\"] [weight]' on vertex line")
        })?;
        let _ = network.add_node(name, weight);
    }

    // The header count is only an upper bound: vertices that are neither
    // listed nor linked are never materialized.
    let mut links = Vec::new();
    let mut highest = network.node_count();
    let mut section: Option<Section> = None;
    for (idx, line) in lines {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }
        if trimmed.starts_with('*') {
            let keyword = trimmed.split_whitespace().next().unwrap_or_default();
            section = if keyword.eq_ignore_ascii_case("*arcs") {
                Some(Section::Arcs)
            } else if keyword.eq_ignore_ascii_case("*edges") {
                Some(Section::Edges)
            } else {
                return Err(parse_error(
                    idx,
                    format!("unexpected section '{keyword}', expected *Arcs or *Edges"),
                ));
            };
            continue;
        }
        let Some(section) = section else {
            return Err(parse_error(idx, "link line before *Arcs or *Edges"));
        };
        let (from, to, weight) = parse_link_tokens(trimmed)
            .ok_or_else(|| parse_error(idx, "expected '<from> <to> [weight]'"))?;
        let (from, to) = match (dense_id(from, n_nodes), dense_id(to, n_nodes)) {
            (Some(f), Some(t)) => (f, t),
            _ => {
                return Err(parse_error(
                    idx,
                    format!("node id out of range 1..={n_nodes}"),
                ))
            }
        };
        highest = highest.max(from.max(to) + 1);
        links.push((from, to, weight, section));
    }

    // Vertices not listed explicitly keep their numeric id as name.
    while network.node_count() < highest {
        let id = network.node_count() + 1;
        let _ = network.add_node(id.to_string(), 1.0);
    }
    if network.is_empty() {
        return Err(Error::EmptyInput);
    }
    for (from, to, weight, section) in links {
        let _ = network.add_link(from, to, weight);
        if section == Section::Edges && from != to {
            let _ = network.add_link(to, from, weight);
        }
    }

    Ok(network)
}

/// Parse a whitespace-separated link list.
pub fn read_link_list<R: BufRead>(reader: R) -> Result<Network> {
    let mut network = Network::new();
    let mut ids: HashMap<String, usize> = HashMap::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let content = line.split('#').next().unwrap_or_default().trim();
        if content.is_empty() {
            continue;
        }
        let mut tokens = content.split_whitespace();
        let (Some(from), Some(to)) = (tokens.next(), tokens.next()) else {
            return Err(parse_error(idx, "expected '<from> <to> [weight]'"));
        };
        let weight = match tokens.next() {
            Some(w) => w
                .parse::<f64>()
                .map_err(|_| parse_error(idx, format!("invalid weight '{w}'")))?,
            None => 1.0,
        };
        let from = intern(&mut network, &mut ids, from);
        let to = intern(&mut network, &mut ids, to);
        let _ = network.add_link(from, to, weight);
    }

    if network.is_empty() {
        return Err(Error::EmptyInput);
    }
    Ok(network)
}

fn intern(network: &mut Network, ids: &mut HashMap<String, usize>, token: &str) -> usize {
    if let Some(&id) = ids.get(token) {
        return id;
    }
    let id = network.add_node(token, 1.0);
    let _ = ids.insert(token.to_string(), id);
    id
}

/// `1 "some name" 2.0` or `1 name 2.0`.
fn parse_vertex_line(line: &str) -> Option<(String, f64)> {
    let mut tokens = line.splitn(2, char::is_whitespace);
    let id = tokens.next()?;
    let _ = id.parse::<usize>().ok()?;
    let rest = tokens.next().unwrap_or_default().trim();

    let (name, tail) = match (rest.find('"'), rest.rfind('"')) {
        (Some(start), Some(end)) if start < end => {
            (rest[start + 1..end].to_string(), &rest[end + 1..])
        }
        _ => {
            let mut parts = rest.splitn(2, char::is_whitespace);
            match parts.next() {
                Some(n) if !n.is_empty() => (n.to_string(), parts.next().unwrap_or_default()),
                _ => (id.to_string(), ""),
            }
        }
    };
    let weight = tail
        .split_whitespace()
        .next()
        .and_then(|w| w.parse::<f64>().ok())
        .unwrap_or(1.0);
    Some((name, weight))
}

fn parse_link_tokens(line: &str) -> Option<(usize, usize, f64)> {
    let mut tokens = line.split_whitespace();
    let from = tokens.next()?.parse::<usize>().ok()?;
    let to = tokens.next()?.parse::<usize>().ok()?;
    let weight = match tokens.next() {
        Some(w) => w.parse::<f64>().ok()?,
        None => 1.0,
    };
    Some((from, to, weight))
}

fn dense_id(one_based: usize, n_nodes: usize) -> Option<usize> {
    (1..=n_nodes).contains(&one_based).then(|| one_based - 1)
}

fn parse_error(zero_based_line: usize, message: impl Into<String>) -> Error {
    Error::Parse {
        line: zero_based_line + 1,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const PAJEK: &str = "\
*Vertices 3
1 \"Name of first node\" 1.0
2 \"Name of second node\" 2.0
3 \"Name of third node\" 1.0
*Arcs 4
1 2 1.0
1 3 1.7
2 3 2.0
3 2 1.2
";

    #[test]
    fn test_read_pajek() {
        let network = read_pajek(Cursor::new(PAJEK)).unwrap();
        assert_eq!(network.node_count(), 3);
        assert_eq!(network.names()[1], "Name of second node");
        assert_eq!(network.node_weights(), &[1.0, 2.0, 1.0]);
        assert_eq!(network.link_count(), 4);
        let links: Vec<_> = network.links().collect();
        assert!(links.contains(&(0, 2, 1.7)));
        assert!(links.contains(&(2, 1, 1.2)));
    }

    #[test]
    fn test_read_pajek_edges_are_symmetric() {
        let input = "*Vertices 2\n1 a\n2 b\n*Edges\n1 2 3.0\n";
        let network = read_pajek(Cursor::new(input)).unwrap();
        let links: Vec<_> = network.links().collect();
        assert_eq!(links, vec![(0, 1, 3.0), (1, 0, 3.0)]);
        assert_eq!(network.names(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_read_pajek_unlisted_vertices_and_default_weight() {
        let input = "*Vertices 3\n*Arcs\n1 3\n";
        let network = read_pajek(Cursor::new(input)).unwrap();
        assert_eq!(network.names(), &["1", "2", "3"]);
        assert_eq!(network.links().collect::<Vec<_>>(), vec![(0, 2, 1.0)]);
    }

    #[test]
    fn test_read_pajek_vertex_count_is_an_upper_bound() {
        let input = "*Vertices 1000000000\n1 a\n*Arcs\n1 4\n4 1 2.0\n";
        let network = read_pajek(Cursor::new(input)).unwrap();
        assert_eq!(network.names(), &["a", "2", "3", "4"]);
        assert_eq!(
            network.links().collect::<Vec<_>>(),
            vec![(0, 3, 1.0), (3, 0, 2.0)]
        );
    }

    #[test]
    fn test_read_pajek_rejects_other_formats() {
        let err = read_pajek(Cursor::new("1 2\n2 3\n")).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));
    }

    #[test]
    fn test_read_pajek_rejects_out_of_range_ids() {
        let input = "*Vertices 2\n1 a\n2 b\n*Arcs\n1 9\n";
        let err = read_pajek(Cursor::new(input)).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 5, .. }));
    }

    #[test]
    fn test_read_link_list() {
        let input = "# comment\n10 20 0.5\n20 30\n\n30 10 2 # trailing\n";
        let network = read_link_list(Cursor::new(input)).unwrap();
        assert_eq!(network.names(), &["10", "20", "30"]);
        let links: Vec<_> = network.links().collect();
        assert_eq!(links, vec![(0, 1, 0.5), (1, 2, 1.0), (2, 0, 2.0)]);
    }

    #[test]
    fn test_read_link_list_errors() {
        assert!(matches!(
            read_link_list(Cursor::new("1\n")),
            Err(Error::Parse { line: 1, .. })
        ));
        assert!(matches!(
            read_link_list(Cursor::new("1 2 heavy\n")),
            Err(Error::Parse { line: 1, .. })
        ));
        assert_eq!(
            read_link_list(Cursor::new("# nothing\n")).unwrap_err(),
            Error::EmptyInput
        );
    }
}
