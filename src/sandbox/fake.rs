//! In-memory sandbox runtime for tests.

use anyhow::{Result, anyhow};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::{ContainerInfo, SandboxRuntime};

#[derive(Debug, Default)]
struct State {
    /// name -> running
    containers: BTreeMap<String, bool>,
    images: BTreeSet<String>,
    /// Every mutating call, in order, e.g. `clone acme-slot-0 <- acme-template`
    calls: Vec<String>,
    fail_clone: BTreeSet<String>,
    fail_exec: BTreeSet<String>,
    exec_output: String,
    interactive_exit: i32,
}

#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: RefCell<State>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_containers<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let fake = Self::new();
        for name in names {
            fake.add_container(name);
        }
        fake
    }

    pub fn add_container(&self, name: &str) {
        self.state
            .borrow_mut()
            .containers
            .insert(name.to_string(), false);
    }

    pub fn add_image(&self, image: &str) {
        self.state.borrow_mut().images.insert(image.to_string());
    }

    pub fn has(&self, name: &str) -> bool {
        self.state.borrow().containers.contains_key(name)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.state
            .borrow()
            .containers
            .get(name)
            .copied()
            .unwrap_or(false)
    }

    pub fn names(&self) -> Vec<String> {
        self.state.borrow().containers.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn fail_clone_of(&self, name: &str) {
        self.state.borrow_mut().fail_clone.insert(name.to_string());
    }

    pub fn fail_exec_in(&self, name: &str) {
        self.state.borrow_mut().fail_exec.insert(name.to_string());
    }

    pub fn set_exec_output(&self, output: &str) {
        self.state.borrow_mut().exec_output = output.to_string();
    }

    pub fn set_interactive_exit(&self, code: i32) {
        self.state.borrow_mut().interactive_exit = code;
    }

    fn record(&self, call: String) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl SandboxRuntime for FakeRuntime {
    fn container_exists(&self, name: &str) -> Result<bool> {
        Ok(self.has(name))
    }

    fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.state.borrow().images.contains(image))
    }

    fn build_image(&self, image: &str, _dockerfile: &Path, _context: &Path) -> Result<()> {
        self.record(format!("build {}", image));
        self.add_image(image);
        Ok(())
    }

    fn list_containers(&self, prefix: &str) -> Result<Vec<ContainerInfo>> {
        Ok(self
            .state
            .borrow()
            .containers
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, running)| ContainerInfo {
                name: name.clone(),
                status: if *running { "Up" } else { "Exited (0)" }.to_string(),
            })
            .collect())
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.record(format!("stop {}", name));
        match self.state.borrow_mut().containers.get_mut(name) {
            Some(running) => {
                *running = false;
                Ok(())
            }
            None => Err(anyhow!("no such container: {}", name)),
        }
    }

    fn create_from_image(&self, name: &str, image: &str) -> Result<()> {
        self.record(format!("create {} from {}", name, image));
        self.add_container(name);
        Ok(())
    }

    fn clone_from(&self, name: &str, source: &str) -> Result<()> {
        self.record(format!("clone {} <- {}", name, source));
        if !self.has(source) {
            return Err(anyhow!("clone source {} does not exist", source));
        }
        if self.has(name) {
            return Err(anyhow!("container {} already exists", name));
        }
        // A failed clone leaves a half-made container behind
        self.add_container(name);
        if self.state.borrow().fail_clone.contains(name) {
            return Err(anyhow!("clone of {} failed", name));
        }
        Ok(())
    }

    fn exec(&self, name: &str, argv: &[String]) -> Result<String> {
        self.record(format!("exec {}: {}", name, argv.join(" ")));
        if !self.has(name) {
            return Err(anyhow!("no such container: {}", name));
        }
        if let Some(running) = self.state.borrow_mut().containers.get_mut(name) {
            *running = true;
        }
        if self.state.borrow().fail_exec.contains(name) {
            return Err(anyhow!("command failed in {}", name));
        }
        Ok(self.state.borrow().exec_output.clone())
    }

    fn enter_interactive(&self, name: &str, argv: &[String]) -> Result<i32> {
        self.record(format!("enter {}: {}", name, argv.join(" ")));
        if !self.has(name) {
            return Err(anyhow!("no such container: {}", name));
        }
        Ok(self.state.borrow().interactive_exit)
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.record(format!("remove {}", name));
        self.state.borrow_mut().containers.remove(name);
        Ok(())
    }
}
