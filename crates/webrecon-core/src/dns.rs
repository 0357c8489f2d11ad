//! DNS correlation between hostnames and in-scope addresses.
//!
//! Lookups go through the [`Resolver`] trait so the system resolver can be
//! swapped out. Lookup failures are ordinary negative results and are never
//! surfaced as errors.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Semaphore;

use crate::scope::ScopeResolver;

/// Default number of concurrent DNS lookups.
pub const DEFAULT_RESOLVE_CONCURRENCY: usize = 5;

/// Blocking name resolution backend.
pub trait Resolver: Send + Sync + 'static {
    /// Forward-resolve a hostname.
    fn lookup_host(&self, name: &str) -> io::Result<Vec<IpAddr>>;

    /// Reverse-resolve an address into zero or more hostnames.
    fn lookup_addr(&self, ip: IpAddr) -> io::Result<Vec<String>>;
}

/// The operating system resolver (getaddrinfo / getnameinfo).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn lookup_host(&self, name: &str) -> io::Result<Vec<IpAddr>> {
        dns_lookup::lookup_host(name).map(|ips| ips.into_iter().collect())
    }

    fn lookup_addr(&self, ip: IpAddr) -> io::Result<Vec<String>> {
        let hostname = dns_lookup::lookup_addr(&ip)?;
        // getnameinfo falls back to the numeric form when there is no PTR.
        if hostname == ip.to_string() {
            return Ok(Vec::new());
        }
        Ok(vec![hostname])
    }
}

/// Shared hostname → addresses correlation table.
///
/// Cloning yields another handle to the same table.
#[derive(Debug, Clone, Default)]
pub struct HostnameMap {
    inner: Arc<Mutex<BTreeMap<String, BTreeSet<IpAddr>>>>,
}

impl HostnameMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, BTreeSet<IpAddr>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, hostname: &str, ip: IpAddr) {
        self.lock().entry(hostname.to_string()).or_default().insert(ip);
    }

    pub fn extend(&self, hostname: &str, ips: impl IntoIterator<Item = IpAddr>) {
        self.lock()
            .entry(hostname.to_string())
            .or_default()
            .extend(ips);
    }

    pub fn hostnames(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn addresses(&self, hostname: &str) -> BTreeSet<IpAddr> {
        self.lock().get(hostname).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Point-in-time copy of the table.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeSet<IpAddr>> {
        self.lock().clone()
    }
}

/// Forward-resolves names and keeps only the in-scope answers.
#[derive(Clone)]
pub struct DnsScope {
    scope: Arc<ScopeResolver>,
    resolver: Arc<dyn Resolver>,
}

impl DnsScope {
    pub fn new(scope: Arc<ScopeResolver>, resolver: Arc<dyn Resolver>) -> Self {
        Self { scope, resolver }
    }

    /// Resolve `name` and return its in-scope addresses.
    ///
    /// `(false, [])` when resolution fails or nothing resolved is in scope.
    pub async fn check_domain(&self, name: &str) -> (bool, Vec<IpAddr>) {
        tracing::debug!(hostname = %name, "Resolving");

        let resolver = self.resolver.clone();
        let owned = name.to_string();
        let resolved = match tokio::task::spawn_blocking(move || resolver.lookup_host(&owned)).await
        {
            Ok(Ok(ips)) => ips,
            Ok(Err(e)) => {
                tracing::debug!(hostname = %name, error = %e, "Forward lookup failed");
                return (false, Vec::new());
            }
            Err(e) => {
                tracing::warn!(hostname = %name, error = %e, "DNS worker join failed");
                return (false, Vec::new());
            }
        };

        let mut matches: Vec<IpAddr> = Vec::new();
        for ip in resolved {
            if self.scope.is_ip_in_scope(ip) && !matches.contains(&ip) {
                matches.push(ip);
            }
        }
        (!matches.is_empty(), matches)
    }
}

/// Bulk reverse resolution of addresses into a [`HostnameMap`].
pub struct ReverseMapper {
    resolver: Arc<dyn Resolver>,
    concurrency: usize,
}

impl ReverseMapper {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            concurrency: DEFAULT_RESOLVE_CONCURRENCY,
        }
    }

    /// Override the lookup pool size (clamped to at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Reverse-resolve every address and record each hostname found.
    ///
    /// Trailing root dots are stripped. Failed lookups record nothing.
    /// Returns once every lookup has finished.
    pub async fn map_hostnames<I>(&self, addresses: I, table: &HostnameMap)
    where
        I: IntoIterator<Item = IpAddr>,
    {
        let permits = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        let semaphore = Arc::new(Semaphore::new(permits as usize));

        for ip in addresses {
            // Taken before spawning so at most `concurrency` lookups exist.
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::warn!(address = %ip, error = %e, "DNS semaphore closed");
                    break;
                }
            };
            let resolver = Arc::clone(&self.resolver);
            let table = table.clone();

            tokio::spawn(async move {
                let _permit = permit;

                tracing::debug!(address = %ip, "Resolving");
                let hosts = match tokio::task::spawn_blocking(move || resolver.lookup_addr(ip))
                    .await
                {
                    Ok(Ok(hosts)) => hosts,
                    Ok(Err(_)) => return,
                    Err(e) => {
                        tracing::warn!(address = %ip, error = %e, "DNS worker join failed");
                        return;
                    }
                };

                for host in hosts {
                    let host = host.trim_end_matches('.');
                    if !host.is_empty() {
                        table.insert(host, ip);
                    }
                }
            });
        }

        // Every lookup holds a permit until it finishes.
        if let Err(e) = semaphore.acquire_many(permits).await {
            tracing::warn!(error = %e, "DNS semaphore closed");
        }

        tracing::info!(hostnames = table.len(), "Reverse DNS mapping complete");
    }
}
