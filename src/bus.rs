//! Object bus: where nodes are registered and how calls reach them.
//!
//! [`ObjectBus`] is the registration surface the exporter writes to. A
//! transport adapter implements it to publish objects on a real bus; the
//! in-process [`LocalBus`] keeps the registrations in memory and dispatches
//! property reads and method calls to them directly.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::address::Address;
use crate::error::{BusError, TreeError};
use crate::model::{Entry, Value};

pub const OBJECT_INTERFACE: &str = "org.gnome.UPnP.MediaObject2";
pub const CONTAINER_INTERFACE: &str = "org.gnome.UPnP.MediaContainer2";
pub const ITEM_INTERFACE: &str = "org.gnome.UPnP.MediaItem2";

/// Interface name reported when a property set is registered twice.
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

pub type Getter = Arc<dyn Fn() -> Result<Value, TreeError> + Send + Sync>;
pub type Method = Arc<dyn Fn(&[Value]) -> Result<Value, BusError> + Send + Sync>;

/// Read-only properties of one object, grouped by interface.
#[derive(Clone, Default)]
pub struct PropertySet {
    interfaces: BTreeMap<String, BTreeMap<String, Getter>>,
}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property evaluated on every read.
    pub fn with(
        mut self,
        interface: &str,
        name: &str,
        getter: impl Fn() -> Result<Value, TreeError> + Send + Sync + 'static,
    ) -> Self {
        self.interfaces
            .entry(interface.to_string())
            .or_default()
            .insert(name.to_string(), Arc::new(getter));
        self
    }

    /// Add a property whose value never changes.
    pub fn constant(self, interface: &str, name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.with(interface, name, move || Ok(value.clone()))
    }
}

/// Callable members of one interface on one object.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: BTreeMap<String, Method>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        name: &str,
        method: impl Fn(&[Value]) -> Result<Value, BusError> + Send + Sync + 'static,
    ) -> Self {
        self.methods.insert(name.to_string(), Arc::new(method));
        self
    }
}

/// Registration surface for exported objects.
pub trait ObjectBus: Send + Sync {
    /// Register the property set of the object at `address`.
    fn export(&self, address: &Address, properties: PropertySet) -> Result<(), BusError>;

    /// Register callable `methods` for `interface` at `address`.
    fn export_methods(
        &self,
        address: &Address,
        interface: &str,
        methods: MethodTable,
    ) -> Result<(), BusError>;

    /// Drop every registration strictly below `root`. Returns how many
    /// objects were removed.
    fn unexport_below(&self, root: &Address) -> usize;
}

#[derive(Default)]
struct Registration {
    properties: Option<PropertySet>,
    methods: BTreeMap<String, MethodTable>,
}

/// In-process registry and dispatcher.
pub struct LocalBus {
    service_name: String,
    objects: RwLock<BTreeMap<Address, Registration>>,
}

impl LocalBus {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.read().keys().cloned().collect()
    }

    /// Read one property of the object at `path`.
    pub fn get_property(&self, path: &str, interface: &str, name: &str) -> Result<Value, BusError> {
        let getter = {
            let objects = self.read();
            let props = Self::properties(&objects, path, interface)?;
            props
                .get(name)
                .cloned()
                .ok_or_else(|| BusError::UnknownMember {
                    interface: interface.to_string(),
                    member: name.to_string(),
                })?
        };
        Ok(getter()?)
    }

    /// Read every property of `interface` on the object at `path`.
    pub fn get_all(&self, path: &str, interface: &str) -> Result<Entry, BusError> {
        let getters: Vec<(String, Getter)> = {
            let objects = self.read();
            Self::properties(&objects, path, interface)?
                .iter()
                .map(|(name, getter)| (name.clone(), Arc::clone(getter)))
                .collect()
        };
        getters
            .into_iter()
            .map(|(name, getter)| -> Result<(String, Value), BusError> {
                Ok((name, getter()?))
            })
            .collect()
    }

    /// Invoke `member` of `interface` on the object at `path`.
    pub fn call(
        &self,
        path: &str,
        interface: &str,
        member: &str,
        args: &[Value],
    ) -> Result<Value, BusError> {
        let method = {
            let objects = self.read();
            let address = Address::parse(path)?;
            let registration = objects
                .get(&address)
                .ok_or_else(|| BusError::UnknownObject(address.clone()))?;
            let table = registration.methods.get(interface).ok_or_else(|| {
                BusError::UnknownInterface {
                    address: address.clone(),
                    interface: interface.to_string(),
                }
            })?;
            table
                .methods
                .get(member)
                .cloned()
                .ok_or_else(|| BusError::UnknownMember {
                    interface: interface.to_string(),
                    member: member.to_string(),
                })?
        };
        debug!(%path, %interface, %member, "dispatching call");
        method(args)
    }

    fn properties<'a>(
        objects: &'a BTreeMap<Address, Registration>,
        path: &str,
        interface: &str,
    ) -> Result<&'a BTreeMap<String, Getter>, BusError> {
        let address = Address::parse(path)?;
        let registration = objects
            .get(&address)
            .ok_or_else(|| BusError::UnknownObject(address.clone()))?;
        registration
            .properties
            .as_ref()
            .and_then(|set| set.interfaces.get(interface))
            .ok_or(BusError::UnknownInterface {
                address,
                interface: interface.to_string(),
            })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<Address, Registration>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<Address, Registration>> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObjectBus for LocalBus {
    fn export(&self, address: &Address, properties: PropertySet) -> Result<(), BusError> {
        let mut objects = self.write();
        let registration = objects.entry(address.clone()).or_default();
        if registration.properties.is_some() {
            return Err(BusError::AlreadyExported {
                address: address.clone(),
                interface: PROPERTIES_INTERFACE.to_string(),
            });
        }
        registration.properties = Some(properties);
        Ok(())
    }

    fn export_methods(
        &self,
        address: &Address,
        interface: &str,
        methods: MethodTable,
    ) -> Result<(), BusError> {
        let mut objects = self.write();
        let registration = objects.entry(address.clone()).or_default();
        if registration.methods.contains_key(interface) {
            return Err(BusError::AlreadyExported {
                address: address.clone(),
                interface: interface.to_string(),
            });
        }
        registration.methods.insert(interface.to_string(), methods);
        Ok(())
    }

    fn unexport_below(&self, root: &Address) -> usize {
        let mut objects = self.write();
        let before = objects.len();
        objects.retain(|address, _| !root.is_ancestor_of(address));
        before - objects.len()
    }
}

/// Decode `(offset: u32, max: u32, filter: [String])` listing arguments.
pub fn listing_args(member: &str, args: &[Value]) -> Result<(u32, u32, Vec<String>), BusError> {
    let invalid = |reason: &str| BusError::InvalidArgs {
        member: member.to_string(),
        reason: reason.to_string(),
    };
    match args {
        [offset, max, filter] => Ok((
            offset.as_u32().ok_or_else(|| invalid("offset must be u32"))?,
            max.as_u32().ok_or_else(|| invalid("max must be u32"))?,
            filter
                .as_str_list()
                .ok_or_else(|| invalid("filter must be a string list"))?
                .to_vec(),
        )),
        _ => Err(invalid("expected (offset, max, filter)")),
    }
}
