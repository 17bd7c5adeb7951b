//! Recording toolchain used by unit tests.
//!
//! `FakeToolchain` records every invocation in order, fails invocations that
//! match a scripted rule, and otherwise writes the files the real tool would
//! produce so that later pipeline steps find what they expect.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::builders::common::sanitize_module_name;
use crate::toolchain::{Invocation, ToolOutput, Toolchain};

pub const DEFAULT_PACKAGE_JSON: &str = r#"{
  "name": "Kit",
  "platforms": [
    { "platformName": "ios", "version": "15.0", "options": [] },
    { "platformName": "macos", "version": "12.0", "options": [] }
  ],
  "products": [],
  "targets": [
    { "name": "Widgets", "type": "regular", "dependencies": [] },
    { "name": "WidgetsCLI", "type": "executable", "dependencies": [] },
    { "name": "WidgetsTests", "type": "test", "dependencies": [] }
  ]
}"#;

pub struct FakeToolchain {
    calls: Mutex<Vec<Invocation>>,
    linked: Mutex<Vec<Vec<(PathBuf, bool)>>>,
    failures: Vec<(String, String)>,
    package_json: String,
    package_name: String,
    resources: bool,
    c_family: bool,
    objects: bool,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            linked: Mutex::new(Vec::new()),
            failures: Vec::new(),
            package_json: DEFAULT_PACKAGE_JSON.to_string(),
            package_name: "Kit".to_string(),
            resources: false,
            c_family: false,
            objects: true,
        }
    }

    /// Fails `program` whenever one of its arguments contains `needle`.
    pub fn fail_when(mut self, program: &str, needle: &str) -> Self {
        self.failures.push((program.to_string(), needle.to_string()));
        self
    }

    pub fn with_package_json(mut self, name: &str, json: &str) -> Self {
        self.package_name = name.to_string();
        self.package_json = json.to_string();
        self
    }

    /// `swift build` also emits the target's resource bundle.
    pub fn with_resources(mut self) -> Self {
        self.resources = true;
        self
    }

    /// `swift build` emits only C-family objects.
    pub fn c_family_only(mut self) -> Self {
        self.c_family = true;
        self
    }

    /// `swift build` succeeds but emits no object files.
    pub fn without_objects(mut self) -> Self {
        self.objects = false;
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Invocations of `program` with an argument containing `needle`.
    pub fn count(&self, program: &str, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|inv| matches(inv, program, needle))
            .count()
    }

    /// Invocations of `program` whose first argument is `subcommand`.
    pub fn count_subcommand(&self, program: &str, subcommand: &str) -> usize {
        self.calls()
            .iter()
            .filter(|inv| inv.program == program && inv.args.first().is_some_and(|a| a == subcommand))
            .count()
    }

    /// Index of the first matching invocation.
    pub fn position(&self, program: &str, needle: &str) -> Option<usize> {
        self.calls()
            .iter()
            .position(|inv| matches(inv, program, needle))
    }

    pub fn find(&self, program: &str, needle: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|inv| matches(inv, program, needle))
            .collect()
    }

    /// Object lists passed to each libtool call, with on-disk existence at link time.
    pub fn linked_objects(&self) -> Vec<Vec<(PathBuf, bool)>> {
        self.linked.lock().unwrap().clone()
    }

    fn swift_build(&self, inv: &Invocation) -> ToolOutput {
        let (Some(package), Some(target), Some(config), Some(triple)) = (
            value_after(inv, "--package-path"),
            value_after(inv, "--target"),
            value_after(inv, "--configuration"),
            value_after(inv, "--triple"),
        ) else {
            return ToolOutput::failed(Some(1), "missing swift build arguments");
        };

        let module = sanitize_module_name(&target);
        let products = PathBuf::from(package)
            .join(".build")
            .join(unversioned(&triple))
            .join(config);
        let object_dir = products.join(format!("{}.build", module));
        fs::create_dir_all(&object_dir).unwrap();
        fs::create_dir_all(products.join("Modules")).unwrap();

        if self.objects {
            let object = if self.c_family { "shim.c.o" } else { "Widget.swift.o" };
            fs::write(object_dir.join(object), format!("obj:{}", triple)).unwrap();
        }
        if !self.c_family {
            fs::write(object_dir.join(format!("{}-Swift.h", module)), "// generated").unwrap();
            fs::write(
                products.join("Modules").join(format!("{}.swiftmodule", module)),
                "module",
            )
            .unwrap();
            fs::write(
                products.join("Modules").join(format!("{}.swiftdoc", module)),
                "doc",
            )
            .unwrap();
        }
        if inv.args.iter().any(|a| a == "-emit-module-interface") {
            fs::write(
                object_dir.join(format!("{}.swiftinterface", module)),
                "// swift-interface-format-version: 1.0",
            )
            .unwrap();
        }
        if self.resources {
            let bundle = products.join(format!("{}_{}.bundle", self.package_name, target));
            fs::create_dir_all(&bundle).unwrap();
            fs::write(bundle.join("strings.json"), "{}").unwrap();
        }

        ToolOutput::ok("Compiling\nBuild complete!\n")
    }

    fn libtool(&self, inv: &Invocation) -> ToolOutput {
        let (Some(output), Some(filelist)) = (value_after(inv, "-o"), value_after(inv, "-filelist"))
        else {
            return ToolOutput::failed(Some(1), "missing libtool arguments");
        };
        let listed = fs::read_to_string(&filelist).unwrap_or_default();
        let objects: Vec<(PathBuf, bool)> = listed
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| (PathBuf::from(l), Path::new(l).exists()))
            .collect();
        let count = objects.len();
        self.linked.lock().unwrap().push(objects);
        write_file(Path::new(&output), &format!("archive:{}", count));
        ToolOutput::ok("")
    }

    fn lipo(&self, inv: &Invocation) -> ToolOutput {
        let Some(output) = value_after(inv, "-output") else {
            return ToolOutput::failed(Some(1), "missing -output");
        };
        let inputs: Vec<String> = inv
            .args
            .iter()
            .skip_while(|a| *a != "-create")
            .skip(1)
            .take_while(|a| *a != "-output")
            .map(|input| fs::read_to_string(input).unwrap_or_default())
            .collect();
        write_file(Path::new(&output), &inputs.join("+"));
        ToolOutput::ok("")
    }

    fn create_xcframework(&self, inv: &Invocation) -> ToolOutput {
        let Some(output) = value_after(inv, "-output") else {
            return ToolOutput::failed(Some(1), "missing -output");
        };
        write_file(&Path::new(&output).join("Info.plist"), "xcframework");
        ToolOutput::ok("xcframework successfully written out")
    }

    fn archive(&self, inv: &Invocation) -> ToolOutput {
        let (Some(scheme), Some(archive)) = (value_after(inv, "-scheme"), value_after(inv, "-archivePath"))
        else {
            return ToolOutput::failed(Some(1), "missing archive arguments");
        };
        let root = PathBuf::from(format!("{}.xcarchive", archive));
        let framework = root
            .join("Products/Library/Frameworks")
            .join(format!("{}.framework", scheme));
        let swiftmodule = framework.join(format!("Modules/{}.swiftmodule", scheme));
        write_file(&framework.join(&scheme), "binary");
        write_file(&swiftmodule.join("arm64-apple-ios.swiftinterface"), "public");
        write_file(
            &swiftmodule.join("arm64-apple-ios.private.swiftinterface"),
            "private",
        );
        write_file(
            &root.join(format!("dSYMs/{}.framework.dSYM/Contents/Info.plist", scheme)),
            "dsym",
        );
        ToolOutput::ok("** ARCHIVE SUCCEEDED **")
    }
}

impl Toolchain for FakeToolchain {
    fn run(&self, inv: &Invocation) -> ToolOutput {
        self.calls.lock().unwrap().push(inv.clone());

        let scripted_failure = self
            .failures
            .iter()
            .any(|(program, needle)| matches(inv, program, needle));
        if scripted_failure {
            return ToolOutput::failed(Some(1), format!("error: {} failed", inv.program));
        }

        match (inv.program.as_str(), inv.args.first().map(String::as_str)) {
            ("xcrun", Some("--sdk")) => ToolOutput::ok(format!(
                "/Xcode/Platforms/Fake.platform/Developer/SDKs/{}.sdk\n",
                inv.args.get(1).cloned().unwrap_or_default()
            )),
            ("xcrun", _) => {
                if let Some(output) = value_after(inv, "-o") {
                    write_file(Path::new(&output), "accessor");
                }
                ToolOutput::ok("")
            }
            ("swift", Some("build")) => self.swift_build(inv),
            ("swift", Some("package")) => ToolOutput::ok(self.package_json.clone()),
            ("libtool", _) => self.libtool(inv),
            ("lipo", _) => self.lipo(inv),
            ("xcodebuild", Some("-create-xcframework")) => self.create_xcframework(inv),
            ("xcodebuild", Some("archive")) => self.archive(inv),
            _ => ToolOutput::ok(""),
        }
    }
}

fn matches(inv: &Invocation, program: &str, needle: &str) -> bool {
    inv.program == program && (needle.is_empty() || inv.args.iter().any(|a| a.contains(needle)))
}

pub fn value_after(inv: &Invocation, flag: &str) -> Option<String> {
    inv.args
        .iter()
        .position(|a| a == flag)
        .and_then(|i| inv.args.get(i + 1))
        .cloned()
}

/// `arm64-apple-ios15.0-simulator` -> `arm64-apple-ios-simulator`.
fn unversioned(triple: &str) -> String {
    triple
        .split('-')
        .enumerate()
        .map(|(i, part)| {
            if i == 2 {
                part.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.')
            } else {
                part
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

#[test]
fn test_unversioned_triple() {
    assert_eq!(unversioned("arm64-apple-ios15.0-simulator"), "arm64-apple-ios-simulator");
    assert_eq!(unversioned("arm64_32-apple-watchos7.0"), "arm64_32-apple-watchos");
    assert_eq!(unversioned("x86_64-apple-ios14.0-macabi"), "x86_64-apple-ios-macabi");
}
