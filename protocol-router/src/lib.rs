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

//! Protocol Router (C3): the service registry plus `/pkg.Service/Method`
//! routing over pooled connections from [`connection_pool`].

pub mod registry;
pub mod router;

pub use registry::ServiceRegistry;
pub use router::{parse_full_method, ParsedMethod, ProtocolRouter};
