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

//! Shared test fixtures: a one-shot loopback HTTP server, archive builders
//! and in-memory stand-ins for the AUR and the pacman databases.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;

use crate::alpm_manager::PackageDatabase;
use crate::aur::client::{MetadataService, PackageRecord};
use crate::error::AurforgeResult;

/// A server that answers exactly one request with a canned response
pub struct OneShotServer {
    pub base_url: String,
    request_line: mpsc::Receiver<String>,
}

impl OneShotServer {
    pub fn serve(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        let content_type = content_type.to_string();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let _ = tx.send(read_request(&stream));

            let head = format!(
                "HTTP/1.1 {} X\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                content_type,
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(&body).unwrap();
            stream.flush().unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            request_line: rx,
        }
    }

    pub fn json(status: u16, body: &str) -> Self {
        Self::serve(status, "application/json", body.as_bytes().to_vec())
    }

    /// The request line the server received, e.g. `GET /rpc/?v=5... HTTP/1.1`
    pub fn request_line(&self) -> String {
        self.request_line
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap()
    }
}

/// A server that sends the first `sent` bytes of a `declared`-byte body
/// and then holds the connection open without writing more
pub fn stalling_server(declared: usize, sent: &[u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let sent = sent.to_vec();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&stream);
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/x-gzip\r\nContent-Length: {}\r\n\r\n",
            declared
        );
        stream.write_all(head.as_bytes()).unwrap();
        stream.write_all(&sent).unwrap();
        stream.flush().unwrap();
        thread::sleep(std::time::Duration::from_secs(60));
    });

    format!("http://{}", addr)
}

/// Read one request head and return its request line
fn read_request(stream: &TcpStream) -> String {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut first = String::new();
    reader.read_line(&mut first).unwrap();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
            break;
        }
    }
    first.trim_end().to_string()
}

/// An address nothing is listening on
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Build an AUR-style snapshot: `<pkgname>/PKGBUILD` plus extra files, gzipped
pub fn snapshot_archive(pkgname: &str, pkgbuild: &str, extra: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut files = vec![("PKGBUILD", pkgbuild)];
    files.extend_from_slice(extra);

    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(
                &mut header,
                format!("{}/{}", pkgname, name),
                content.as_bytes(),
            )
            .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}

/// An empty but valid tar.gz
pub fn empty_archive() -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let builder = tar::Builder::new(encoder);
    builder.into_inner().unwrap().finish().unwrap()
}


/// A minimal AUR record whose snapshot is `<name>.tar.gz`
pub fn record(name: &str, version: &str) -> PackageRecord {
    PackageRecord {
        name: name.to_string(),
        version: version.to_string(),
        description: Some(format!("{} description", name)),
        category_id: None,
        num_votes: 0,
        out_of_date: None,
        maintainer: Some("maint".to_string()),
        first_submitted: 1_300_000_000,
        last_modified: 1_700_000_000,
        url_path: format!("/cgit/aur.git/snapshot/{}.tar.gz", name),
        url: None,
        license: Vec::new(),
    }
}

/// In-memory AUR
#[derive(Default)]
pub struct FakeMetadata {
    records: HashMap<String, PackageRecord>,
    pub info_calls: RefCell<Vec<String>>,
}

impl FakeMetadata {
    pub fn with(records: impl IntoIterator<Item = PackageRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.name.clone(), r)).collect(),
            info_calls: RefCell::default(),
        }
    }
}

#[async_trait(?Send)]
impl MetadataService for FakeMetadata {
    async fn info(&self, name: &str) -> AurforgeResult<Option<PackageRecord>> {
        self.info_calls.borrow_mut().push(name.to_string());
        Ok(self.records.get(name).cloned())
    }

    async fn search(&self, query: &str) -> AurforgeResult<Vec<PackageRecord>> {
        let mut found: Vec<PackageRecord> = self
            .records
            .values()
            .filter(|r| r.name.contains(query))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn multiinfo(&self, names: &[String]) -> AurforgeResult<Vec<PackageRecord>> {
        Ok(names
            .iter()
            .filter_map(|n| self.records.get(n).cloned())
            .collect())
    }
}

/// In-memory local and sync databases
#[derive(Default)]
pub struct FakeDatabase {
    installed: RefCell<HashMap<String, String>>,
    repo: HashSet<String>,
}

impl FakeDatabase {
    pub fn new(installed: &[(&str, &str)], repo: &[&str]) -> Self {
        Self {
            installed: RefCell::new(
                installed
                    .iter()
                    .map(|(n, v)| (n.to_string(), v.to_string()))
                    .collect(),
            ),
            repo: repo.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn install(&self, name: &str, version: &str) {
        self.installed
            .borrow_mut()
            .insert(name.to_string(), version.to_string());
    }
}

impl PackageDatabase for FakeDatabase {
    fn installed_version(&self, name: &str) -> AurforgeResult<Option<String>> {
        Ok(self.installed.borrow().get(name).cloned())
    }

    fn sync_repo(&self, name: &str) -> AurforgeResult<Option<String>> {
        Ok(self.repo.contains(name).then(|| "extra".to_string()))
    }

    fn foreign_packages(&self) -> AurforgeResult<Vec<(String, String)>> {
        let mut foreign: Vec<(String, String)> = self
            .installed
            .borrow()
            .iter()
            .filter(|(name, _)| !self.repo.contains(*name))
            .map(|(n, v)| (n.clone(), v.clone()))
            .collect();
        foreign.sort();
        Ok(foreign)
    }
}
