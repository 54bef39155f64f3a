//! Throwaway front-end project layouts

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

pub const ROOT_SOURCE: &str = "export default function Triangle() {\n  return null;\n}\n";
pub const LEAF_SOURCE: &str = "export default function Leaf() {\n  return null;\n}\n";

/// A project directory holding the two HMR probe files
pub struct FixtureProject {
    pub dir: TempDir,
}

impl FixtureProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let comps = dir.path().join("src/comps");
        fs::create_dir_all(&comps).unwrap();
        fs::write(comps.join("triangle.jsx"), ROOT_SOURCE).unwrap();
        fs::write(comps.join("triangle_1_1_2_1_2_2_1.jsx"), LEAF_SOURCE).unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{ "devDependencies": { "vite": "^5.2.0", "@farmfe/core": "^1.3.0" } }"#,
        )
        .unwrap();
        Self { dir }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn root_file(&self) -> PathBuf {
        self.dir.path().join("src/comps/triangle.jsx")
    }

    pub fn leaf_file(&self) -> PathBuf {
        self.dir.path().join("src/comps/triangle_1_1_2_1_2_2_1.jsx")
    }
}
