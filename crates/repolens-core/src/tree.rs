//! Project file tree built from ingested file paths.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

/// One entry of a project's file tree. Only folders have children.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileNode>,
}

impl FileNode {
    fn file(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: NodeKind::File,
            children: Vec::new(),
        }
    }

    fn folder(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: NodeKind::Folder,
            children: Vec::new(),
        }
    }
}

/// Build the top-level nodes for a set of `/`-separated paths.
///
/// Entries keep first-seen order. Empty path segments are ignored, so
/// `"src//main.rs"` and `"/src/main.rs"` land in the same place.
pub fn build_file_tree<'a, I>(paths: I) -> Vec<FileNode>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut roots: Vec<FileNode> = Vec::new();

    for path in paths {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let Some((file, dirs)) = parts.split_last() else {
            continue;
        };

        let mut level = &mut roots;
        for dir in dirs {
            let idx = match level
                .iter()
                .position(|n| n.kind == NodeKind::Folder && n.name == *dir)
            {
                Some(i) => i,
                None => {
                    level.push(FileNode::folder(dir));
                    level.len() - 1
                }
            };
            level = &mut level[idx].children;
        }

        if !level
            .iter()
            .any(|n| n.kind == NodeKind::File && n.name == *file)
        {
            level.push(FileNode::file(file));
        }
    }

    roots
}

/// Render nodes as an indented ASCII tree, one entry per line.
///
/// ```text
/// src
/// ├── lib.rs
/// └── util
///     └── mod.rs
/// README.md
/// ```
pub fn render_file_tree(nodes: &[FileNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        out.push_str(&node.name);
        out.push('\n');
        render_children(&node.children, "", &mut out);
    }
    out
}

fn render_children(children: &[FileNode], prefix: &str, out: &mut String) {
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        out.push_str(prefix);
        out.push_str(if last { "└── " } else { "├── " });
        out.push_str(&child.name);
        out.push('\n');
        let next = format!("{}{}", prefix, if last { "    " } else { "│   " });
        render_children(&child.children, &next, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_folders() {
        let tree = build_file_tree(["src/lib.rs", "src/util/mod.rs", "README.md", "src/main.rs"]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].name, "src");
        assert_eq!(tree[0].kind, NodeKind::Folder);
        let names: Vec<&str> = tree[0].children.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["lib.rs", "util", "main.rs"]);
        assert_eq!(tree[1], FileNode::file("README.md"));
    }

    #[test]
    fn duplicate_and_empty_paths_ignored() {
        let tree = build_file_tree(["a.txt", "a.txt", "", "/"]);
        assert_eq!(tree, vec![FileNode::file("a.txt")]);
    }

    #[test]
    fn renders_ascii_tree() {
        let tree = build_file_tree(["src/lib.rs", "src/util/mod.rs", "README.md"]);
        let expected = "src\n├── lib.rs\n└── util\n    └── mod.rs\nREADME.md\n";
        assert_eq!(render_file_tree(&tree), expected);
    }

    #[test]
    fn serializes_with_type_field() {
        let tree = build_file_tree(["docs/a.md"]);
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json[0]["type"], "folder");
        assert_eq!(json[0]["children"][0]["type"], "file");
        assert!(json[0]["children"][0].get("children").is_none());
    }
}
