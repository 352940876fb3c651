// Copyright 2026 The Supervision Core Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::{HashMap, HashSet, VecDeque};
use supervision_common::{ServiceSpec, SupervisionError, SupervisionResult};

/// Orders `specs` so that every service comes after the services named in
/// its `dependencies` (§9 "open question — dependency ordering": the
/// source never implements this, so this is additive behavior layered
/// onto §4.7's reconciliation, not a documented source behavior). A
/// dependency naming a service absent from `specs` is ignored rather than
/// treated as an error, since the missing service may simply not be part
/// of this reconciliation batch (e.g. it was configured earlier and isn't
/// changing).
pub fn topo_sort_by_dependencies(specs: &[ServiceSpec]) -> SupervisionResult<Vec<ServiceSpec>> {
    let by_name: HashMap<&str, &ServiceSpec> = specs.iter().map(|s| (s.name.as_str(), s)).collect();

    let mut in_degree: HashMap<&str, usize> = specs.iter().map(|s| (s.name.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for spec in specs {
        for dep in &spec.dependencies {
            if by_name.contains_key(dep.as_str()) {
                *in_degree.get_mut(spec.name.as_str()).unwrap() += 1;
                dependents.entry(dep.as_str()).or_default().push(&spec.name);
            }
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut ordered = Vec::with_capacity(specs.len());
    let mut visited = HashSet::new();

    while let Some(name) = queue.pop_front() {
        if !visited.insert(name) {
            continue;
        }
        ordered.push((*by_name.get(name).unwrap()).clone());
        if let Some(children) = dependents.get(name) {
            for child in children {
                let degree = in_degree.get_mut(child).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(child);
                }
            }
        }
    }

    if ordered.len() != specs.len() {
        let stuck: Vec<&str> = specs
            .iter()
            .map(|s| s.name.as_str())
            .filter(|n| !visited.contains(n))
            .collect();
        return Err(SupervisionError::InvalidArgument(format!(
            "dependency cycle detected among services: {}",
            stuck.join(", ")
        )));
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use std::time::Duration;
    use supervision_common::{Isolation, ResourceSpec};

    fn spec(name: &str, deps: &[&str]) -> ServiceSpec {
        ServiceSpec {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            binary_path: "/bin/true".into(),
            args: vec![],
            env: Map::new(),
            work_dir: "/tmp".into(),
            isolation: Isolation::Process,
            resources: ResourceSpec::default(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            auto_restart: false,
            health_check_interval: Duration::from_secs(30),
            peer_timeout: Duration::from_secs(5),
            enabled: true,
        }
    }

    #[test]
    fn orders_dependencies_before_dependents() {
        let specs = vec![spec("c", &["b"]), spec("a", &[]), spec("b", &["a"])];
        let ordered = topo_sort_by_dependencies(&specs).unwrap();
        let positions: HashMap<&str, usize> = ordered
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();
        assert!(positions["a"] < positions["b"]);
        assert!(positions["b"] < positions["c"]);
    }

    #[test]
    fn detects_cycles() {
        let specs = vec![spec("a", &["b"]), spec("b", &["a"])];
        assert!(matches!(
            topo_sort_by_dependencies(&specs),
            Err(SupervisionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn ignores_dependencies_outside_the_batch() {
        let specs = vec![spec("a", &["not-in-batch"])];
        let ordered = topo_sort_by_dependencies(&specs).unwrap();
        assert_eq!(ordered.len(), 1);
    }
}
