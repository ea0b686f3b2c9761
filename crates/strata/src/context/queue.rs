use ash::vk;

///Abstract queue that collects a [ash::vk::Queue](ash::vk::Queue) and its family.
#[derive(Clone, Debug)]
pub struct Queue {
    pub inner: vk::Queue,
    pub family_index: u32,
    pub properties: vk::QueueFamilyProperties,
}

///Selects the queue family a resource is initially owned by. Resolved against the device's queues when the resource is constructed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueSelector {
    ///Exactly this family.
    Family(u32),
    ///The first family that supports all of those capabilities.
    Capabilities(vk::QueueFlags),
}

impl QueueSelector {
    ///Returns the family index this selector resolves to on `queues`, if any.
    pub fn resolve(&self, queues: &[Queue]) -> Option<u32> {
        match self {
            QueueSelector::Family(family) => queues
                .iter()
                .find(|q| q.family_index == *family)
                .map(|q| q.family_index),
            QueueSelector::Capabilities(flags) => queues
                .iter()
                .find(|q| q.properties.queue_flags.contains(*flags))
                .map(|q| q.family_index),
        }
    }
}

impl From<u32> for QueueSelector {
    fn from(family: u32) -> Self {
        QueueSelector::Family(family)
    }
}

impl From<vk::QueueFlags> for QueueSelector {
    fn from(flags: vk::QueueFlags) -> Self {
        QueueSelector::Capabilities(flags)
    }
}

pub struct QueueBuilder {
    ///The family's index.
    pub family_index: u32,
    ///its properties
    pub properties: vk::QueueFamilyProperties,
    ///The length of this vector determins how many instances of this queue are created. The number determins the
    /// priority of each queue on the hardware. See the [documentation](https://www.khronos.org/registry/vulkan/specs/1.3-extensions/man/html/VkDeviceQueueCreateInfo.html) for more information about this topic.
    pub priorities: Vec<f32>,
}

impl QueueBuilder {
    ///Sets the queue ammount that is being created (length of the vector) and each queues priority. Have a look at the
    /// `priorities` field documentation.
    ///
    /// Note that only the first `n` priorities are resprected if the length of the vector exceeds `n = self.properties.queue_count`.
    pub fn with_queues(&mut self, mut queue_priorities: Vec<f32>) {
        if queue_priorities.len() > self.properties.queue_count as usize {
            queue_priorities.resize(self.properties.queue_count as usize, 0.0);
        }

        self.priorities = queue_priorities;
    }

    pub fn as_create_info(&self) -> vk::DeviceQueueCreateInfo<'_> {
        vk::DeviceQueueCreateInfo::default()
            .queue_family_index(self.family_index)
            .queue_priorities(&self.priorities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(family: u32, flags: vk::QueueFlags) -> Queue {
        Queue {
            inner: vk::Queue::null(),
            family_index: family,
            properties: vk::QueueFamilyProperties {
                queue_flags: flags,
                queue_count: 1,
                ..Default::default()
            },
        }
    }

    #[test]
    fn selector_resolution() {
        let queues = [
            queue(0, vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            queue(1, vk::QueueFlags::TRANSFER),
            queue(2, vk::QueueFlags::COMPUTE),
        ];
        assert_eq!(QueueSelector::Family(1).resolve(&queues), Some(1));
        assert_eq!(QueueSelector::Family(5).resolve(&queues), None);
        assert_eq!(
            QueueSelector::from(vk::QueueFlags::COMPUTE).resolve(&queues),
            Some(0)
        );
        assert_eq!(
            QueueSelector::from(vk::QueueFlags::TRANSFER).resolve(&queues),
            Some(1)
        );
        assert_eq!(
            QueueSelector::from(vk::QueueFlags::SPARSE_BINDING).resolve(&queues),
            None
        );
    }

    #[test]
    fn builder_clamps_priorities() {
        let mut builder = QueueBuilder {
            family_index: 0,
            properties: queue(0, vk::QueueFlags::GRAPHICS).properties,
            priorities: Vec::new(),
        };
        builder.with_queues(vec![1.0, 0.5, 0.25]);
        assert_eq!(builder.priorities, vec![1.0]);
        assert_eq!(builder.as_create_info().queue_count, 1);
    }
}
