//! Tree serialization.
//!
//! ```text
//! # Codelength = 3.1415 bits.
//! 1:1:1 0.0625 "a"
//! 1:1:2 0.05 "b"
//! 1:2:1 0.04 "c"
//! ```
//!
//! One line per node: its 1-based address in the tree, its flow, and its
//! quoted name. Modules appear in child order; nodes within a bottom module
//! by descending flow, ties by index.

use super::tree::TreeNode;
use crate::error::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write `tree` in the `.tree` format.
///
/// `names` and `sizes` are indexed by leaf index.
pub fn write_tree<W: Write>(
    writer: &mut W,
    tree: &TreeNode,
    code_length: f64,
    names: &[String],
    sizes: &[f64],
) -> Result<()> {
    writeln!(writer, "# Codelength = {code_length} bits.")?;
    let mut address = Vec::new();
    write_module(writer, tree, &mut address, names, sizes)?;
    Ok(())
}

fn write_module<W: Write>(
    writer: &mut W,
    module: &TreeNode,
    address: &mut Vec<usize>,
    names: &[String],
    sizes: &[f64],
) -> Result<()> {
    if !module.is_leaf() {
        for (i, child) in module.next_level.iter().enumerate() {
            address.push(i + 1);
            write_module(writer, child, address, names, sizes)?;
            let _ = address.pop();
        }
        return Ok(());
    }

    let mut leaves: Vec<usize> = module.members.iter().copied().collect();
    leaves.sort_by(|&a, &b| sizes[b].total_cmp(&sizes[a]).then(a.cmp(&b)));
    for (k, &leaf) in leaves.iter().enumerate() {
        for part in address.iter() {
            write!(writer, "{part}:")?;
        }
        writeln!(writer, "{} {} \"{}\"", k + 1, sizes[leaf], names[leaf])?;
    }
    Ok(())
}

/// Write `tree` to a file at `path`, replacing it.
pub fn save_tree(
    path: impl AsRef<Path>,
    tree: &TreeNode,
    code_length: f64,
    names: &[String],
    sizes: &[f64],
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_tree(&mut writer, tree, code_length, names, sizes)?;
    writer.flush()?;
    Ok(())
}

/// Render `tree` in the `.tree` format.
pub fn tree_to_string(tree: &TreeNode, code_length: f64, names: &[String], sizes: &[f64]) -> String {
    let mut buf = Vec::new();
    // Writing to a Vec cannot fail.
    let _ = write_tree(&mut buf, tree, code_length, names, sizes);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn module(members: &[usize], level: usize) -> TreeNode {
        TreeNode {
            members: members.iter().copied().collect::<BTreeSet<_>>(),
            level,
            ..TreeNode::default()
        }
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("v{i}")).collect()
    }

    #[test]
    fn test_addresses_and_leaf_order() {
        let mut left = module(&[0, 1, 2], 2);
        left.next_level = vec![module(&[0, 2], 3), module(&[1], 3)];
        let mut root = module(&[0, 1, 2, 3], 1);
        root.next_level = vec![left, module(&[3], 2)];
        let sizes = [0.1, 0.2, 0.3, 0.4];

        let out = tree_to_string(&root, 2.5, &names(4), &sizes);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "# Codelength = 2.5 bits.",
                "1:1:1 0.3 \"v2\"",
                "1:1:2 0.1 \"v0\"",
                "1:2:1 0.2 \"v1\"",
                "2:1 0.4 \"v3\"",
            ]
        );
    }

    #[test]
    fn test_equal_flows_keep_index_order() {
        let mut root = module(&[0, 1, 2], 1);
        root.next_level = vec![module(&[2, 0, 1], 2)];
        let out = tree_to_string(&root, 1.0, &names(3), &[0.25, 0.25, 0.5]);
        let order: Vec<&str> = out.lines().skip(1).map(|l| l.rsplit(' ').next().unwrap_or("")).collect();
        assert_eq!(order, vec!["\"v2\"", "\"v0\"", "\"v1\""]);
    }

    #[test]
    fn test_unsplit_root() {
        let root = module(&[0, 1], 1);
        let out = tree_to_string(&root, 1.0, &names(2), &[0.5, 0.5]);
        assert_eq!(out.lines().nth(1), Some("1 0.5 \"v0\""));
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn test_save_tree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.tree");
        let mut root = module(&[0, 1], 1);
        root.next_level = vec![module(&[0], 2), module(&[1], 2)];
        save_tree(&path, &root, 0.75, &names(2), &[0.6, 0.4]).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, tree_to_string(&root, 0.75, &names(2), &[0.6, 0.4]));
        assert!(written.starts_with("# Codelength = 0.75 bits.\n"));
    }
}
